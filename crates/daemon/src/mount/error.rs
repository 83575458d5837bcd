use std::path::PathBuf;

use super::MountStatus;

#[derive(Debug, thiserror::Error)]
pub enum MountError {
    #[error("already mounted at {}", .0.display())]
    AlreadyMounted(PathBuf),
    #[error("not mounted")]
    NotMounted,
    /// Another lifecycle call is still attaching or detaching
    #[error("mount is busy ({0})")]
    Busy(MountStatus),
    #[error("invalid mount point {}: {reason}", path.display())]
    InvalidMountPoint { path: PathBuf, reason: String },
    #[error("capacity of {capacity} bytes is below the {used} bytes already stored")]
    InsufficientCapacity { used: u64, capacity: u64 },
    #[error("mount failed: {0}")]
    MountFailed(String),
    #[error("unmount failed: {0}")]
    UnmountFailed(String),
}
