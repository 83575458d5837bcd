use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod op;
pub mod ops;

use op::{Op, OpContext};

#[derive(Parser, Debug)]
#[command(name = "memfs", version, about = "Mount an in-memory filesystem through FUSE")]
pub struct Cli {
    /// Config file; defaults to the platform config directory
    #[arg(long, global = true, env = "MEMFS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Mount a fresh filesystem and serve it until interrupted
    #[cfg(feature = "fuse")]
    Mount(ops::Mount),
    /// Print the effective configuration as TOML
    Config(ops::ShowConfig),
}

impl Command {
    pub async fn execute(&self, ctx: &OpContext) -> anyhow::Result<String> {
        match self {
            #[cfg(feature = "fuse")]
            Command::Mount(op) => Ok(op.execute(ctx).await?.to_string()),
            Command::Config(op) => Ok(op.execute(ctx).await?),
        }
    }
}
