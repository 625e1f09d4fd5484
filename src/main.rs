use clap::Parser;

fn main() -> anyhow::Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();

    let cli = audit_cuos::cli::Cli::parse();
    audit_cuos::run(cli)
}
