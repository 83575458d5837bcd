use clap::Args;

use crate::cli::op::{Op, OpContext};
use memfs_daemon::{Config, ConfigError};

#[derive(Args, Debug, Clone)]
pub struct ShowConfig {
    /// Also print where the default config file is looked up
    #[arg(long)]
    pub path: bool,
}

#[async_trait::async_trait]
impl Op for ShowConfig {
    type Error = ConfigError;
    type Output = String;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut out = String::new();
        if self.path {
            match Config::default_path() {
                Some(path) => out.push_str(&format!("# {}\n", path.display())),
                None => out.push_str("# no config directory on this platform\n"),
            }
        }
        out.push_str(&ctx.config.to_toml_string()?);
        Ok(out)
    }
}
