use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod model;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let default = if cli.verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    commands::run_command(cli)
}
