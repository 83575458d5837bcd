use memfs_daemon::Config;

/// Shared state handed to every command
#[derive(Debug, Clone)]
pub struct OpContext {
    pub config: Config,
}

#[async_trait::async_trait]
pub trait Op: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;
    type Output;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error>;
}
