//! Report assembly and output.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use tracing::info;

use crate::aggregate::AuditReport;

pub mod wikitext;

pub use wikitext::render_role_table;

/// Subject sets that get highlighted rows in the rendered tables.
#[derive(Debug, Default)]
pub struct Highlights {
    pub arbitrators: HashSet<String>,
    pub ombuds: HashSet<String>,
}

/// Render one wikitext table per role.
pub fn render_report(report: &AuditReport, highlights: &Highlights) -> Vec<String> {
    report
        .roles
        .iter()
        .map(|role_report| render_role_table(role_report, &report.interval, highlights))
        .collect()
}

/// Write the rendered tables to `path`, separated by blank lines.
pub fn write_report(path: &Path, tables: &[String]) -> anyhow::Result<()> {
    let joined = tables.join("\n\n\n");
    std::fs::write(path, joined).with_context(|| format!("writing {}", path.display()))?;
    info!(path = %path.display(), "report written");
    Ok(())
}
