//! Seam between the mount controller and the kernel
//!
//! The FUSE backend is the production implementation. Tests substitute an
//! in-process backend so the lifecycle can be exercised without `/dev/fuse`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::NodeStore;
use uuid::Uuid;

use super::SessionGate;

/// Kernel-facing options for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub fs_name: String,
    pub attr_ttl: Duration,
    pub auto_unmount: bool,
    pub allow_other: bool,
}

/// Everything a backend needs to serve one mount
#[derive(Clone)]
pub struct SessionContext {
    pub session_id: Uuid,
    pub mount_point: PathBuf,
    pub store: Arc<NodeStore>,
    /// Callbacks must enter this gate and refuse work once it is closed
    pub gate: Arc<SessionGate>,
    pub options: SessionOptions,
}

/// A live kernel session
pub trait KernelSession: Send {
    /// Detach from the mount point and wait for the request loop to exit
    fn detach(self: Box<Self>);
}

pub trait MountBackend: Send + Sync + 'static {
    /// Attach a session at `ctx.mount_point`; the request loop runs in the background
    fn attach(&self, ctx: SessionContext) -> std::io::Result<Box<dyn KernelSession>>;
}
