//! Command-line interface definition.

use std::path::PathBuf;

use clap::Parser;

use crate::source::mediawiki::{DEFAULT_API_URL, DEFAULT_META_API_URL};

/// Produce six-month checkuser and oversight activity tables.
#[derive(Parser, Debug)]
#[command(name = "audit-cuos", version, about)]
pub struct Cli {
    /// Output file for the rendered wikitext tables.
    #[arg(long, default_value = "stats.txt")]
    pub output: PathBuf,

    /// Bot username; prompted for interactively when absent.
    #[arg(long, env = "AUDIT_CUOS_USERNAME")]
    pub username: Option<String>,

    /// Bot password; prompted for (hidden) when absent.
    #[arg(long, env = "AUDIT_CUOS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Home-wiki API endpoint.
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Meta-wiki API endpoint (rights log, global groups).
    #[arg(long, default_value = DEFAULT_META_API_URL)]
    pub meta_api_url: String,

    /// Cap on parallel per-subject fetches. Defaults to the rayon pool's
    /// own sizing.
    #[arg(long)]
    pub jobs: Option<usize>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
