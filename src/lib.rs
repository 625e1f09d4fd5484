//! Six-month activity audit tables for checkuser and oversight
//! functionaries.
//!
//! The pipeline: compute the reporting interval, log in to the wiki, fetch
//! the rights log and per-subject action logs through the paginated
//! [`source::EventSource`] seam, aggregate counts and tenure windows per
//! subject, and render wikitext tables.

use anyhow::Context;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod aggregate;
pub mod cli;
pub mod model;
pub mod report;
pub mod source;

use aggregate::{Orchestrator, reporting_interval};
use cli::Cli;
use report::{Highlights, render_report, write_report};
use source::{Credentials, MediaWikiClient};

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("audit_cuos={default_level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_credentials(cli: &Cli) -> anyhow::Result<Credentials> {
    Credentials::resolve(cli.username.clone(), cli.password.clone())
}

/// Run the full audit: login, aggregate, render, write.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    init_logging(cli.verbose);

    if let Some(jobs) = cli.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .context("configuring worker pool")?;
    }

    let credentials = resolve_credentials(&cli)?;
    let client = MediaWikiClient::new(&credentials.username, &cli.api_url, &cli.meta_api_url)?;
    client.login(&credentials).context("logging in")?;

    let interval = reporting_interval(Utc::now());
    info!(
        start = %interval.window_start,
        end = %interval.window_end,
        "reporting interval"
    );

    let highlights = Highlights {
        arbitrators: client
            .arbitrators()
            .context("fetching arbitration committee members")?
            .into_iter()
            .collect(),
        ombuds: client
            .ombuds()
            .context("fetching ombuds")?
            .into_iter()
            .collect(),
    };

    let progress = ProgressBar::new(0);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{bar:30.cyan} {pos}/{len} {msg}")
            .context("progress template")?,
    );
    let orchestrator = Orchestrator::new(&client, interval);
    let audit = orchestrator.run(|done, total, subject| {
        progress.set_length(total as u64);
        progress.set_position(done as u64);
        progress.set_message(subject.to_string());
    })?;
    progress.finish_and_clear();

    let tables = render_report(&audit, &highlights);
    write_report(&cli.output, &tables)?;
    Ok(())
}
