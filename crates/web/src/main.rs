// Module declarations
mod api;
mod state;

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use dronetrigger_core::{Config, Drone};
use tracing_subscriber::EnvFilter;

use crate::{api::start_api, state::WebState};

const DEFAULT_CONFIG: &str = "/etc/dronetrigger.yml";

#[derive(Parser)]
#[command(name = "dronetrigger-web")]
#[command(about = "Restart Drone builds from authenticated webhook calls")]
struct Cli {
    /// Configuration file
    #[arg(long, env = "DRONETRIGGER_CONFIG", default_value = DEFAULT_CONFIG)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // Load and validate config
    let config = Config::from_file(&cli.config).context("unable to load config")?;
    let web = config.web()?.clone();
    web.validate()?;

    let drone = Drone::new(&config.url, &config.token);
    let state = WebState::new(web, Arc::new(drone));
    start_api(state).await
}
