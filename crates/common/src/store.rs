//! Thread-safe node store
//!
//! One `RwLock` guards the whole arena: lookups, reads and listings share it,
//! every mutation takes it exclusively, so nobody ever sees a half-applied
//! insert or remove. Events are queued while the write lock is still held
//! (which fixes their order to the commit order) and delivered after it is
//! released, so subscribers are free to call back into the store.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::SystemTime;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use crate::error::{FsError, Result};
use crate::events::{Event, EventBus};
use crate::node::{DirListing, Inode, NodeAttr, NodeContent, Usage};
use crate::path::{validate_name, PathKey};
use crate::space::{SpaceAccountant, DEFAULT_CAPACITY_BYTES};
use crate::tree::{Tree, Tx};

/// Node limit used when none is configured
pub const DEFAULT_MAX_NODES: u64 = 1024 * 1024;

/// The in-memory tree with its space accountant and event bus
#[derive(Debug)]
pub struct NodeStore {
    tree: RwLock<Tree>,
    space: SpaceAccountant,
    events: EventBus,
    outbox: Outbox,
    max_nodes: AtomicU64,
}

impl Default for NodeStore {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY_BYTES, DEFAULT_MAX_NODES)
    }
}

impl NodeStore {
    /// Create an empty store holding only the root directory
    ///
    /// A capacity or node limit of 0 selects the default.
    pub fn new(capacity_bytes: u64, max_nodes: u64) -> Self {
        Self {
            tree: RwLock::new(Tree::new()),
            space: SpaceAccountant::new(capacity_bytes),
            events: EventBus::new(),
            outbox: Outbox::default(),
            max_nodes: AtomicU64::new(effective_max_nodes(max_nodes)),
        }
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn space(&self) -> &SpaceAccountant {
        &self.space
    }

    // ========================================
    // Path operations
    // ========================================

    pub fn resolve(&self, path: &str) -> Result<NodeAttr> {
        let path = PathKey::parse(path)?;
        let tree = self.tree.read();
        let ino = tree.resolve(&path)?;
        tree.attr(ino)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.resolve(path).is_ok()
    }

    /// Create a file; the parent directory must already exist
    pub fn insert_file(&self, path: &str, content: impl Into<Vec<u8>>) -> Result<Inode> {
        let path = PathKey::parse(path)?;
        let content = content.into();
        self.insert_at(&path, NodeContent::File(content))
    }

    /// Create an empty directory; the parent directory must already exist
    pub fn insert_directory(&self, path: &str) -> Result<Inode> {
        let path = PathKey::parse(path)?;
        self.insert_at(&path, NodeContent::Directory(IndexMap::new()))
    }

    /// Create `path` and any missing ancestors as directories
    ///
    /// Each directory created publishes its own event. Existing directories
    /// along the way are left alone; a file in the way is `NotADirectory`.
    pub fn create_dir_all(&self, path: &str) -> Result<Inode> {
        let path = PathKey::parse(path)?;
        self.commit(|tx| tx.create_dir_all(&path))
    }

    /// Remove a node, and with `recursive` a whole subtree
    ///
    /// The subtree and its bytes go in one step: either everything is gone
    /// and the capacity released, or nothing changed.
    pub fn remove(&self, path: &str, recursive: bool) -> Result<()> {
        let path = PathKey::parse(path)?;
        self.commit(|tx| {
            let ino = tx.tree.resolve(&path)?;
            tx.remove(ino, recursive)
        })
    }

    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize> {
        let path = PathKey::parse(path)?;
        self.commit(|tx| {
            let ino = tx.tree.resolve(&path)?;
            tx.write(ino, offset, data)
        })
    }

    pub fn read(&self, path: &str, offset: u64, len: usize) -> Result<Vec<u8>> {
        let path = PathKey::parse(path)?;
        let tree = self.tree.read();
        let ino = tree.resolve(&path)?;
        tree.read(ino, offset, len)
    }

    /// The whole content of a file
    pub fn read_all(&self, path: &str) -> Result<Vec<u8>> {
        self.read(path, 0, usize::MAX)
    }

    pub fn list(&self, path: &str) -> Result<DirListing> {
        let path = PathKey::parse(path)?;
        let tree = self.tree.read();
        let ino = tree.resolve(&path)?;
        tree.listing(ino)
    }

    /// Swap a file's content, reserving or releasing the size difference
    pub fn replace_content(&self, path: &str, content: impl Into<Vec<u8>>) -> Result<()> {
        let path = PathKey::parse(path)?;
        let content = content.into();
        self.commit(|tx| {
            let ino = tx.tree.resolve(&path)?;
            tx.replace(ino, content)
        })
    }

    pub fn truncate(&self, path: &str, size: u64) -> Result<()> {
        let path = PathKey::parse(path)?;
        self.commit(|tx| {
            let ino = tx.tree.resolve(&path)?;
            tx.set_len(ino, size)
        })
    }

    pub fn rename(&self, from: &str, to: &str, replace: bool) -> Result<()> {
        let from = PathKey::parse(from)?;
        let to = PathKey::parse(to)?;
        if from.is_root() {
            return Err(FsError::InvalidPath(from.to_string()));
        }
        if to.is_root() {
            return Err(FsError::InvalidPath(to.to_string()));
        }
        self.commit(|tx| {
            let parent = tx.tree.resolve(&from.parent())?;
            let new_parent = tx.tree.resolve(&to.parent())?;
            tx.rename(parent, from.name(), new_parent, to.name(), replace)
        })
    }

    // ========================================
    // Inode operations
    // ========================================

    pub fn attr(&self, ino: Inode) -> Result<NodeAttr> {
        self.tree.read().attr(ino)
    }

    pub fn path_of(&self, ino: Inode) -> Result<PathKey> {
        self.tree.read().path_of(ino)
    }

    /// Find `name` inside the directory `parent`
    pub fn lookup(&self, parent: Inode, name: &str) -> Result<NodeAttr> {
        validate_name(name)?;
        let tree = self.tree.read();
        match tree.child(parent, name)? {
            Some(ino) => tree.attr(ino),
            None => Err(FsError::NotFound(tree.path_of(parent)?.join(name)?.to_string())),
        }
    }

    pub fn read_at(&self, ino: Inode, offset: u64, len: usize) -> Result<Vec<u8>> {
        self.tree.read().read(ino, offset, len)
    }

    pub fn write_at(&self, ino: Inode, offset: u64, data: &[u8]) -> Result<usize> {
        self.commit(|tx| tx.write(ino, offset, data))
    }

    pub fn list_ino(&self, ino: Inode) -> Result<DirListing> {
        self.tree.read().listing(ino)
    }

    /// Create an empty file inside `parent`
    pub fn create_file_in(&self, parent: Inode, name: &str) -> Result<NodeAttr> {
        self.commit(|tx| {
            let ino = tx.insert(parent, name, NodeContent::File(Vec::new()))?;
            tx.tree.attr(ino)
        })
    }

    /// Create an empty directory inside `parent`
    pub fn mkdir_in(&self, parent: Inode, name: &str) -> Result<NodeAttr> {
        self.commit(|tx| {
            let ino = tx.insert(parent, name, NodeContent::Directory(IndexMap::new()))?;
            tx.tree.attr(ino)
        })
    }

    /// Remove the file `name` from `parent`
    pub fn unlink_in(&self, parent: Inode, name: &str) -> Result<()> {
        validate_name(name)?;
        self.commit(|tx| {
            let ino = existing_child(tx, parent, name)?;
            if tx.tree.node(ino)?.children().is_some() {
                return Err(FsError::IsADirectory(tx.tree.path_of(ino)?.to_string()));
            }
            tx.remove(ino, false)
        })
    }

    /// Remove the empty directory `name` from `parent`
    pub fn rmdir_in(&self, parent: Inode, name: &str) -> Result<()> {
        validate_name(name)?;
        self.commit(|tx| {
            let ino = existing_child(tx, parent, name)?;
            if tx.tree.node(ino)?.children().is_none() {
                return Err(FsError::NotADirectory(tx.tree.path_of(ino)?.to_string()));
            }
            tx.remove(ino, false)
        })
    }

    pub fn rename_in(
        &self,
        parent: Inode,
        name: &str,
        new_parent: Inode,
        new_name: &str,
        replace: bool,
    ) -> Result<()> {
        self.commit(|tx| tx.rename(parent, name, new_parent, new_name, replace))
    }

    /// Resize a file and return its new attributes
    pub fn set_len(&self, ino: Inode, size: u64) -> Result<NodeAttr> {
        self.commit(|tx| {
            tx.set_len(ino, size)?;
            tx.tree.attr(ino)
        })
    }

    /// Update access and modification times; not reported as an event
    pub fn set_times(
        &self,
        ino: Inode,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> Result<NodeAttr> {
        self.commit(|tx| {
            tx.set_times(ino, accessed, modified)?;
            tx.tree.attr(ino)
        })
    }

    // ========================================
    // Accounting
    // ========================================

    pub fn usage(&self) -> Usage {
        let nodes = self.tree.read().len();
        Usage {
            capacity_bytes: self.space.capacity(),
            used_bytes: self.space.used(),
            nodes,
            max_nodes: self.max_nodes.load(Ordering::Acquire),
        }
    }

    /// Sum of every file buffer, computed from the tree itself
    pub fn total_file_bytes(&self) -> u64 {
        self.tree.read().file_bytes()
    }

    /// Re-derive used bytes from the live tree and switch to a new capacity
    ///
    /// A capacity of 0 selects the default. Returns the recomputed used
    /// count; calling it again with the same capacity changes nothing. Fails
    /// with `CapacityExceeded` and leaves the old capacity in place if the
    /// tree already holds more than the new capacity.
    pub fn configure_capacity(&self, capacity_bytes: u64) -> Result<u64> {
        // held until the new capacity is set so no write lands in between
        let tree = self.tree.write();
        let used = tree.file_bytes();
        self.space.reset_used(used);

        let effective = if capacity_bytes == 0 {
            DEFAULT_CAPACITY_BYTES
        } else {
            capacity_bytes
        };
        if used > effective {
            return Err(FsError::CapacityExceeded {
                requested: used,
                available: effective,
            });
        }
        self.space.set_capacity(effective);
        Ok(used)
    }

    fn insert_at(&self, path: &PathKey, content: NodeContent) -> Result<Inode> {
        if path.is_root() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        self.commit(|tx| {
            let parent = tx.tree.resolve(&path.parent())?;
            tx.insert(parent, path.name(), content)
        })
    }

    /// Run a mutation under the write lock, then publish what it recorded
    ///
    /// Events recorded before a failure are still published: they describe
    /// changes that were applied (e.g. directories made by `create_dir_all`
    /// before it hit a file).
    fn commit<T>(&self, op: impl FnOnce(&mut Tx<'_>) -> Result<T>) -> Result<T> {
        let result = {
            let mut tree = self.tree.write();
            let mut tx = Tx::new(&mut tree, &self.space, self.max_nodes.load(Ordering::Acquire));
            let result = op(&mut tx);
            self.outbox.push(tx.events);
            result
        };
        self.outbox.drain(&self.events);
        result
    }
}

fn existing_child(tx: &Tx<'_>, parent: Inode, name: &str) -> Result<Inode> {
    match tx.tree.child(parent, name)? {
        Some(ino) => Ok(ino),
        None => Err(FsError::NotFound(
            tx.tree.path_of(parent)?.join(name)?.to_string(),
        )),
    }
}

fn effective_max_nodes(max_nodes: u64) -> u64 {
    if max_nodes == 0 {
        DEFAULT_MAX_NODES
    } else {
        max_nodes
    }
}

/// Events waiting for delivery, in commit order
///
/// Whoever finds the outbox idle drains it; everybody else just enqueues.
/// A subscriber that mutates the store from inside its callback therefore
/// enqueues behind the event it is handling instead of deadlocking.
#[derive(Debug, Default)]
struct Outbox {
    queue: Mutex<VecDeque<Event>>,
    draining: AtomicBool,
}

impl Outbox {
    fn push(&self, events: Vec<Event>) {
        if !events.is_empty() {
            self.queue.lock().extend(events);
        }
    }

    fn drain(&self, bus: &EventBus) {
        loop {
            if self
                .draining
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            loop {
                let next = self.queue.lock().pop_front();
                match next {
                    Some(event) => bus.publish(event),
                    None => break,
                }
            }

            self.draining.store(false, Ordering::Release);
            // Something may have been queued between the last pop and the store
            if self.queue.lock().is_empty() {
                return;
            }
        }
    }
}
