use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ethdash_sync::application::{Cli, CommandExecutor};
use ethdash_sync::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    CommandExecutor::execute(cli.command, config).await?;
    Ok(())
}
