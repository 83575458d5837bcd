//! Node types stored in the tree arena and the snapshots handed to callers

use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::events::ObjectType;

/// Inode number, unique for the lifetime of a store
pub type Inode = u64;

/// Root inode number (always 1 in FUSE)
pub const ROOT_INODE: Inode = 1;

/// A file or directory owned by the tree arena
///
/// Parent and children are inode indices into the arena, never references,
/// so the arena is the only owner of every node.
#[derive(Debug, Clone)]
pub(crate) struct Node {
    pub(crate) name: String,
    /// None only for the root
    pub(crate) parent: Option<Inode>,
    pub(crate) created: SystemTime,
    pub(crate) modified: SystemTime,
    pub(crate) accessed: SystemTime,
    pub(crate) changed: SystemTime,
    /// Stamped each time the node is linked into a directory
    pub(crate) link_seq: u64,
    pub(crate) content: NodeContent,
}

#[derive(Debug, Clone)]
pub(crate) enum NodeContent {
    /// File bytes; the file size is always the buffer length
    File(Vec<u8>),
    /// Children in insertion order, name -> inode
    Directory(IndexMap<String, Inode>),
}

impl Node {
    pub(crate) fn new(name: String, parent: Option<Inode>, content: NodeContent) -> Self {
        let now = SystemTime::now();
        Self {
            name,
            parent,
            created: now,
            modified: now,
            accessed: now,
            changed: now,
            link_seq: 0,
            content,
        }
    }

    pub(crate) fn object_type(&self) -> ObjectType {
        match self.content {
            NodeContent::File(_) => ObjectType::File,
            NodeContent::Directory(_) => ObjectType::Directory,
        }
    }

    pub(crate) fn size(&self) -> u64 {
        match &self.content {
            NodeContent::File(data) => data.len() as u64,
            NodeContent::Directory(_) => 0,
        }
    }

    pub(crate) fn children(&self) -> Option<&IndexMap<String, Inode>> {
        match &self.content {
            NodeContent::Directory(children) => Some(children),
            NodeContent::File(_) => None,
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut IndexMap<String, Inode>> {
        match &mut self.content {
            NodeContent::Directory(children) => Some(children),
            NodeContent::File(_) => None,
        }
    }

    pub(crate) fn touch(&mut self) {
        let now = SystemTime::now();
        self.modified = now;
        self.changed = now;
    }
}

/// Point-in-time attributes of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAttr {
    pub inode: Inode,
    pub kind: ObjectType,
    pub name: String,
    /// Content length for files, 0 for directories
    pub size: u64,
    /// 1 for files, 2 + child directory count for directories
    pub nlink: u32,
    pub created: SystemTime,
    pub modified: SystemTime,
    pub accessed: SystemTime,
    pub changed: SystemTime,
}

impl NodeAttr {
    pub fn is_dir(&self) -> bool {
        self.kind == ObjectType::Directory
    }
}

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: ObjectType,
    pub inode: Inode,
    /// Strictly increasing in listing order and never reused, so it stays a
    /// valid resume point after earlier entries are removed
    pub seq: u64,
}

/// A directory's children, captured atomically, in insertion order
///
/// The listing is a snapshot: it can be iterated any number of times.
/// Readers that page through a live directory resume with [`DirListing::after`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListing {
    /// Inode of the listed directory
    pub inode: Inode,
    /// Inode of its parent (the root is its own parent)
    pub parent: Inode,
    entries: Vec<DirEntry>,
}

impl DirListing {
    pub(crate) fn new(inode: Inode, parent: Inode, entries: Vec<DirEntry>) -> Self {
        Self {
            inode,
            parent,
            entries,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DirEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|e| e.name == name)
    }

    /// Entries linked after the one stamped `seq`, whether or not it still exists
    pub fn after(&self, seq: u64) -> impl Iterator<Item = &DirEntry> {
        let start = self.entries.partition_point(|e| e.seq <= seq);
        self.entries[start..].iter()
    }
}

impl<'a> IntoIterator for &'a DirListing {
    type Item = &'a DirEntry;
    type IntoIter = std::slice::Iter<'a, DirEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl IntoIterator for DirListing {
    type Item = DirEntry;
    type IntoIter = std::vec::IntoIter<DirEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Space and node usage figures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub capacity_bytes: u64,
    pub used_bytes: u64,
    pub nodes: u64,
    pub max_nodes: u64,
}

impl Usage {
    pub fn available_bytes(&self) -> u64 {
        self.capacity_bytes.saturating_sub(self.used_bytes)
    }
}
