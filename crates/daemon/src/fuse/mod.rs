//! FUSE integration for the in-memory filesystem
//!
//! This module serves the node store to the kernel, so any process can use
//! ordinary file APIs on the mount point while the host program keeps
//! mutating the tree.
//!
//! # Architecture
//!
//! - `Bridge`: one method per FUSE operation, returning a payload or an errno
//! - `MemoryFs`: `fuser::Filesystem` adapter that gates each request and
//!   forwards it to the bridge
//! - `FuseBackend`: `MountBackend` that spawns a fuser background session
//!
//! Inodes are the store's own node ids, so the kernel's view and the host's
//! view of the tree never need translating.

mod backend;
mod bridge;
mod convert;
mod memory_fs;

pub use backend::FuseBackend;
pub use bridge::{Bridge, BridgeResult, DirSlot, StatFs};
pub use convert::{errno, to_file_attr};
pub use memory_fs::MemoryFs;
