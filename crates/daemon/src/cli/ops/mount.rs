use std::path::PathBuf;

use clap::Args;

use crate::cli::op::{Op, OpContext};
use memfs_daemon::{Event, MemFs, MountInfo, ParentPolicy};

#[derive(Args, Debug, Clone)]
pub struct Mount {
    /// Existing directory to mount on
    pub mount_point: PathBuf,

    /// Capacity in bytes; 0 uses the configured capacity
    #[arg(long, env = "MEMFS_CAPACITY", default_value_t = 0)]
    pub capacity: u64,

    /// Create missing parent directories when seeding
    #[arg(long)]
    pub create_parents: bool,

    /// Populate the filesystem with a few sample files before mounting
    #[arg(long)]
    pub seed_demo: bool,

    /// Print change events to stdout as JSON lines instead of logging them
    #[arg(long)]
    pub json_events: bool,
}

#[derive(Debug)]
pub struct Unmounted(MountInfo);

impl std::fmt::Display for Unmounted {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Unmounted {} (session {})",
            self.0.mount_point.display(),
            self.0.session_id
        )
    }
}

#[async_trait::async_trait]
impl Op for Mount {
    type Error = MountOpError;
    type Output = Unmounted;

    async fn execute(&self, ctx: &OpContext) -> Result<Self::Output, Self::Error> {
        let mut config = ctx.config.clone();
        if self.create_parents {
            config.parent_policy = ParentPolicy::CreateMissing;
        }
        let fs = MemFs::new(config);

        if self.json_events {
            fs.on(print_json);
        } else {
            fs.on(log_event);
        }

        if self.seed_demo {
            seed_demo(&fs).await?;
        }

        let info = fs.mount(&self.mount_point, self.capacity).await?;
        tracing::info!(
            mount_point = %info.mount_point.display(),
            capacity_bytes = info.capacity_bytes,
            "serving; press Ctrl-C to unmount"
        );

        tokio::signal::ctrl_c().await.map_err(MountOpError::Signal)?;
        tracing::info!("interrupt received");

        fs.unmount().await?;
        Ok(Unmounted(info))
    }
}

fn print_json(event: &Event) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{}", line),
        Err(e) => tracing::warn!("failed to encode event: {}", e),
    }
}

fn log_event(event: &Event) {
    tracing::info!(
        event_type = event.event_type(),
        path = %event.path,
        object_type = %event.object_type,
        "filesystem changed"
    );
}

async fn seed_demo(fs: &MemFs) -> Result<(), memfs_daemon::Error> {
    fs.add_file("/hello.txt", "Hello, World!\n").await?;
    fs.add_directory("/subdir").await?;
    fs.add_file("/subdir/test.txt", "Test file in subdir\n")
        .await?;
    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum MountOpError {
    #[error(transparent)]
    Fs(#[from] memfs_daemon::Error),
    #[error("failed to wait for interrupt: {0}")]
    Signal(std::io::Error),
}
