//! In-memory filesystem exposed to the OS through FUSE
//!
//! The host program builds and edits a tree of files through [`MemFs`] while
//! other processes read and write it through the mount point. Every change,
//! from either side, is reported on the event bus.

pub mod config;
pub mod error;
#[cfg(feature = "fuse")]
pub mod fuse;
pub mod memfs;
pub mod mount;

pub use common::{
    DirEntry, DirListing, Event, EventKind, FsError, NodeAttr, NodeStore, ObjectType, PathKey,
    SubscriptionHandle, Usage, ROOT_INODE,
};
pub use config::{Config, ConfigError, ParentPolicy};
pub use error::{Error, Result};
pub use memfs::MemFs;
pub use mount::{MountBackend, MountError, MountInfo, MountStatus};
