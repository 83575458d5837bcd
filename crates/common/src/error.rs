//! Error taxonomy for the node store and its collaborators.

/// Failures returned by [`crate::NodeStore`] and [`crate::SpaceAccountant`].
///
/// Paths carried in the variants are normalized, so they can be shown to
/// users or matched in tests directly.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("path already exists: {0}")]
    AlreadyExists(String),
    /// A path segment that had to be a directory is a file
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("directory not empty: {0}")]
    NotEmpty(String),
    /// Growing the stored bytes would overflow the configured capacity
    #[error("capacity exceeded: requested {requested} bytes, {available} available")]
    CapacityExceeded { requested: u64, available: u64 },
    #[error("node limit of {0} reached")]
    NodeLimitReached(u64),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("name too long: {0}")]
    NameTooLong(String),
}

impl FsError {
    /// Short machine-readable name, stable across releases.
    pub fn kind(&self) -> &'static str {
        match self {
            FsError::NotFound(_) => "not_found",
            FsError::AlreadyExists(_) => "already_exists",
            FsError::NotADirectory(_) => "not_a_directory",
            FsError::IsADirectory(_) => "is_a_directory",
            FsError::NotEmpty(_) => "not_empty",
            FsError::CapacityExceeded { .. } => "capacity_exceeded",
            FsError::NodeLimitReached(_) => "node_limit_reached",
            FsError::InvalidPath(_) => "invalid_path",
            FsError::NameTooLong(_) => "name_too_long",
        }
    }
}

/// A subscriber callback failed while an event was being delivered.
///
/// These never reach the code that triggered the event; the bus logs them
/// and moves on to the next subscriber.
#[derive(thiserror::Error, Debug)]
pub enum SubscriberError {
    #[error("subscriber {id} returned an error: {message}")]
    Failed { id: u64, message: String },
    #[error("subscriber {id} panicked: {message}")]
    Panicked { id: u64, message: String },
}

pub type Result<T, E = FsError> = std::result::Result<T, E>;
