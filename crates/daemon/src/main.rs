use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::op::OpContext;
use cli::Cli;
use memfs_daemon::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let ctx = OpContext { config };

    let output = cli.command.execute(&ctx).await?;
    println!("{}", output);
    Ok(())
}
