mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use dronetrigger_core::{Config, Drone};
use tracing_subscriber::EnvFilter;

use crate::commands::rebuild;

const DEFAULT_CONFIG: &str = "/etc/dronetrigger.yml";

#[derive(Parser)]
#[command(name = "dronetrigger")]
#[command(about = "Restart the last build of a Drone repository")]
struct Cli {
    /// Configuration file
    #[arg(long, env = "DRONETRIGGER_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(flatten)]
    rebuild: rebuild::RebuildArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "dronetrigger=debug,dronetrigger_core=debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = Config::from_file(&cli.config)?;
    let drone = Drone::new(&config.url, &config.token);

    let build = rebuild::execute(&drone, &cli.rebuild).await?;
    if cli.verbose {
        println!(
            "started build {} (sha {}) for {}",
            build.number, build.after, cli.rebuild.repo
        );
    }

    Ok(())
}
