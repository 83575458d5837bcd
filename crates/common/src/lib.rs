//! Core of the memfs virtual filesystem
//!
//! Everything here is independent of FUSE: the [`NodeStore`] owns the tree of
//! files and directories, the [`SpaceAccountant`] caps the bytes it holds,
//! and the [`EventBus`] reports every structural change. The daemon crate
//! puts a kernel session and a host API in front of this.

pub mod error;
pub mod events;
pub mod node;
pub mod path;
pub mod space;
pub mod store;
mod tree;

pub use error::{FsError, SubscriberError};
pub use events::{Event, EventBus, EventKind, ObjectType, SubscriptionHandle};
pub use node::{DirEntry, DirListing, Inode, NodeAttr, Usage, ROOT_INODE};
pub use path::{PathKey, MAX_NAME_LEN};
pub use space::{SpaceAccountant, DEFAULT_CAPACITY_BYTES};
pub use store::{NodeStore, DEFAULT_MAX_NODES};
