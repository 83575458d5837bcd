//! The node arena and the mutations that run under the tree write lock

use std::collections::HashMap;
use std::time::SystemTime;

use indexmap::IndexMap;

use crate::error::{FsError, Result};
use crate::events::{Event, ObjectType};
use crate::node::{DirEntry, DirListing, Inode, Node, NodeAttr, NodeContent, ROOT_INODE};
use crate::path::{validate_name, PathKey};
use crate::space::SpaceAccountant;

/// Arena owning every node, keyed by inode
#[derive(Debug)]
pub(crate) struct Tree {
    nodes: HashMap<Inode, Node>,
    /// Next inode to hand out, starts at 2 as 1 is the root
    next_inode: Inode,
    /// Every link into a directory appends, so stamps rise in child order
    next_link_seq: u64,
}

impl Tree {
    pub(crate) fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_INODE,
            Node::new(String::new(), None, NodeContent::Directory(IndexMap::new())),
        );
        Self {
            nodes,
            next_inode: ROOT_INODE + 1,
            next_link_seq: 1,
        }
    }

    pub(crate) fn len(&self) -> u64 {
        self.nodes.len() as u64
    }

    pub(crate) fn node(&self, ino: Inode) -> Result<&Node> {
        self.nodes
            .get(&ino)
            .ok_or_else(|| FsError::NotFound(format!("inode {}", ino)))
    }

    fn node_mut(&mut self, ino: Inode) -> Result<&mut Node> {
        self.nodes
            .get_mut(&ino)
            .ok_or_else(|| FsError::NotFound(format!("inode {}", ino)))
    }

    /// Walk the parent chain to rebuild the node's path
    pub(crate) fn path_of(&self, ino: Inode) -> Result<PathKey> {
        let mut names = Vec::new();
        let mut current = self.node(ino)?;
        while let Some(parent) = current.parent {
            names.push(current.name.as_str());
            current = self.node(parent)?;
        }

        if names.is_empty() {
            return Ok(PathKey::root());
        }

        let mut path = String::new();
        for name in names.iter().rev() {
            path.push('/');
            path.push_str(name);
        }
        Ok(PathKey::from_normalized(path))
    }

    /// Descend from the root one segment at a time
    pub(crate) fn resolve(&self, path: &PathKey) -> Result<Inode> {
        let mut current = ROOT_INODE;
        let mut walked = String::new();

        for segment in path.segments() {
            let children = self
                .node(current)?
                .children()
                .ok_or_else(|| FsError::NotADirectory(walked.clone()))?;
            current = *children
                .get(segment)
                .ok_or_else(|| FsError::NotFound(path.to_string()))?;
            walked.push('/');
            walked.push_str(segment);
        }

        Ok(current)
    }

    /// Look up a child by name; the parent must be a directory
    pub(crate) fn child(&self, parent: Inode, name: &str) -> Result<Option<Inode>> {
        let children = self
            .node(parent)?
            .children()
            .ok_or_else(|| FsError::NotADirectory(self.display_path(parent)))?;
        Ok(children.get(name).copied())
    }

    pub(crate) fn attr(&self, ino: Inode) -> Result<NodeAttr> {
        let node = self.node(ino)?;
        let nlink = match node.children() {
            Some(children) => {
                let subdirs = children
                    .values()
                    .filter(|child| {
                        self.nodes
                            .get(*child)
                            .is_some_and(|n| n.object_type() == ObjectType::Directory)
                    })
                    .count();
                2 + subdirs as u32
            }
            None => 1,
        };

        Ok(NodeAttr {
            inode: ino,
            kind: node.object_type(),
            name: node.name.clone(),
            size: node.size(),
            nlink,
            created: node.created,
            modified: node.modified,
            accessed: node.accessed,
            changed: node.changed,
        })
    }

    pub(crate) fn listing(&self, ino: Inode) -> Result<DirListing> {
        let node = self.node(ino)?;
        let children = node
            .children()
            .ok_or_else(|| FsError::NotADirectory(self.display_path(ino)))?;

        let entries = children
            .iter()
            .filter_map(|(name, child)| {
                self.nodes.get(child).map(|n| DirEntry {
                    name: name.clone(),
                    kind: n.object_type(),
                    inode: *child,
                    seq: n.link_seq,
                })
            })
            .collect();

        Ok(DirListing::new(ino, node.parent.unwrap_or(ROOT_INODE), entries))
    }

    pub(crate) fn read(&self, ino: Inode, offset: u64, len: usize) -> Result<Vec<u8>> {
        let node = self.node(ino)?;
        match &node.content {
            NodeContent::Directory(_) => Err(FsError::IsADirectory(self.display_path(ino))),
            NodeContent::File(data) => {
                let size = data.len() as u64;
                if offset >= size {
                    return Ok(Vec::new());
                }
                let end = offset.saturating_add(len as u64).min(size);
                Ok(data[offset as usize..end as usize].to_vec())
            }
        }
    }

    /// Sum of every file buffer in the tree
    pub(crate) fn file_bytes(&self) -> u64 {
        self.nodes.values().map(Node::size).sum()
    }

    /// True if `ancestor` is `ino` or one of its ancestors
    fn is_ancestor(&self, ancestor: Inode, ino: Inode) -> bool {
        let mut current = Some(ino);
        while let Some(i) = current {
            if i == ancestor {
                return true;
            }
            current = self.nodes.get(&i).and_then(|n| n.parent);
        }
        false
    }

    fn allocate(&mut self) -> Inode {
        let ino = self.next_inode;
        self.next_inode += 1;
        ino
    }

    fn next_link_seq(&mut self) -> u64 {
        let seq = self.next_link_seq;
        self.next_link_seq += 1;
        seq
    }

    /// Unlink a node from its parent and drop it with all descendants
    ///
    /// Returns the number of file bytes freed.
    fn detach(&mut self, ino: Inode) -> u64 {
        let Some(node) = self.nodes.get(&ino) else {
            return 0;
        };
        let name = node.name.clone();
        let parent = node.parent;
        if let Some(parent) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            if let Some(children) = parent.children_mut() {
                children.shift_remove(&name);
            }
            parent.touch();
        }

        let mut freed = 0;
        let mut stack = vec![ino];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                match node.content {
                    NodeContent::File(data) => freed += data.len() as u64,
                    NodeContent::Directory(children) => stack.extend(children.into_values()),
                }
            }
        }
        freed
    }

    fn display_path(&self, ino: Inode) -> String {
        self.path_of(ino)
            .map(String::from)
            .unwrap_or_else(|_| format!("inode {}", ino))
    }
}

/// A single mutation in progress
///
/// Holds the tree under its write lock. Every committed change records its
/// event here; the store publishes them after the lock is released.
pub(crate) struct Tx<'a> {
    pub(crate) tree: &'a mut Tree,
    space: &'a SpaceAccountant,
    max_nodes: u64,
    pub(crate) events: Vec<Event>,
}

impl<'a> Tx<'a> {
    pub(crate) fn new(tree: &'a mut Tree, space: &'a SpaceAccountant, max_nodes: u64) -> Self {
        Self {
            tree,
            space,
            max_nodes,
            events: Vec::new(),
        }
    }

    /// Add a new child under `parent`
    pub(crate) fn insert(
        &mut self,
        parent: Inode,
        name: &str,
        content: NodeContent,
    ) -> Result<Inode> {
        validate_name(name)?;
        let path = self.tree.path_of(parent)?.join(name)?;

        if self.tree.child(parent, name)?.is_some() {
            return Err(FsError::AlreadyExists(path.to_string()));
        }
        if self.tree.len() >= self.max_nodes {
            return Err(FsError::NodeLimitReached(self.max_nodes));
        }

        let object_type = match content {
            NodeContent::File(ref data) => {
                self.space.reserve(data.len() as u64)?;
                ObjectType::File
            }
            NodeContent::Directory(_) => ObjectType::Directory,
        };

        let ino = self.tree.allocate();
        let mut node = Node::new(name.to_string(), Some(parent), content);
        node.link_seq = self.tree.next_link_seq();
        self.tree.nodes.insert(ino, node);
        let parent_node = self.tree.node_mut(parent)?;
        if let Some(children) = parent_node.children_mut() {
            children.insert(name.to_string(), ino);
        }
        parent_node.touch();

        tracing::debug!(path = %path, inode = ino, kind = %object_type, "node created");
        self.events.push(Event::created(path, object_type));
        Ok(ino)
    }

    /// `mkdir -p`: create every missing directory along `path`
    pub(crate) fn create_dir_all(&mut self, path: &PathKey) -> Result<Inode> {
        let mut current = ROOT_INODE;
        for segment in path.segments() {
            current = match self.tree.child(current, segment)? {
                Some(ino) => ino,
                None => self.insert(
                    current,
                    segment,
                    NodeContent::Directory(IndexMap::new()),
                )?,
            };
        }

        if self.tree.node(current)?.children().is_none() {
            return Err(FsError::NotADirectory(path.to_string()));
        }
        Ok(current)
    }

    /// Remove a node; directories with children need `recursive`
    pub(crate) fn remove(&mut self, ino: Inode, recursive: bool) -> Result<()> {
        if ino == ROOT_INODE {
            return Err(FsError::InvalidPath("/".to_string()));
        }
        let path = self.tree.path_of(ino)?;
        let node = self.tree.node(ino)?;
        let object_type = node.object_type();

        if let Some(children) = node.children() {
            if !children.is_empty() && !recursive {
                return Err(FsError::NotEmpty(path.to_string()));
            }
        }

        let freed = self.tree.detach(ino);
        self.space.release(freed);

        tracing::debug!(path = %path, inode = ino, freed, "node removed");
        self.events.push(Event::deleted(path, object_type));
        Ok(())
    }

    /// Write `data` at `offset`, zero-filling any gap past the end
    ///
    /// The growth is reserved before anything is copied, so a write that
    /// does not fit leaves the file untouched.
    pub(crate) fn write(&mut self, ino: Inode, offset: u64, data: &[u8]) -> Result<usize> {
        let path = self.tree.path_of(ino)?;
        let space = self.space;
        let node = self.tree.node_mut(ino)?;
        let NodeContent::File(buf) = &mut node.content else {
            return Err(FsError::IsADirectory(path.to_string()));
        };

        if data.is_empty() {
            return Ok(0);
        }

        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| usize::try_from(*end).is_ok())
            .ok_or(FsError::CapacityExceeded {
                requested: u64::MAX,
                available: space.available(),
            })?;
        space.reserve(end.saturating_sub(buf.len() as u64))?;

        if end as usize > buf.len() {
            buf.resize(end as usize, 0);
        }
        buf[offset as usize..end as usize].copy_from_slice(data);
        node.touch();

        self.events.push(Event::modified(path, ObjectType::File));
        Ok(data.len())
    }

    /// Resize a file, zero-filling on growth
    pub(crate) fn set_len(&mut self, ino: Inode, size: u64) -> Result<()> {
        let path = self.tree.path_of(ino)?;
        let space = self.space;
        let node = self.tree.node_mut(ino)?;
        let NodeContent::File(buf) = &mut node.content else {
            return Err(FsError::IsADirectory(path.to_string()));
        };

        let current = buf.len() as u64;
        if size == current {
            node.touch();
            return Ok(());
        }
        let new_len = usize::try_from(size).map_err(|_| FsError::CapacityExceeded {
            requested: size - current,
            available: space.available(),
        })?;

        if size > current {
            space.reserve(size - current)?;
        } else {
            space.release(current - size);
        }
        buf.resize(new_len, 0);
        node.touch();

        self.events.push(Event::modified(path, ObjectType::File));
        Ok(())
    }

    /// Swap a file's whole content
    pub(crate) fn replace(&mut self, ino: Inode, content: Vec<u8>) -> Result<()> {
        let path = self.tree.path_of(ino)?;
        let space = self.space;
        let node = self.tree.node_mut(ino)?;
        let NodeContent::File(buf) = &mut node.content else {
            return Err(FsError::IsADirectory(path.to_string()));
        };

        let current = buf.len() as u64;
        let next = content.len() as u64;
        if next > current {
            space.reserve(next - current)?;
        } else {
            space.release(current - next);
        }
        *buf = content;
        node.touch();

        self.events.push(Event::modified(path, ObjectType::File));
        Ok(())
    }

    pub(crate) fn set_times(
        &mut self,
        ino: Inode,
        accessed: Option<SystemTime>,
        modified: Option<SystemTime>,
    ) -> Result<()> {
        let node = self.tree.node_mut(ino)?;
        if let Some(atime) = accessed {
            node.accessed = atime;
        }
        if let Some(mtime) = modified {
            node.modified = mtime;
        }
        node.changed = SystemTime::now();
        Ok(())
    }

    /// Move `parent/name` to `new_parent/new_name`
    ///
    /// An existing destination is replaced when `replace` is set, following
    /// rename(2): the kinds must match and a directory must be empty.
    pub(crate) fn rename(
        &mut self,
        parent: Inode,
        name: &str,
        new_parent: Inode,
        new_name: &str,
        replace: bool,
    ) -> Result<()> {
        validate_name(name)?;
        validate_name(new_name)?;

        let from_parent = self.tree.path_of(parent)?;
        let from = from_parent.join(name)?;
        let source = self
            .tree
            .child(parent, name)?
            .ok_or_else(|| FsError::NotFound(from.to_string()))?;
        let to = self.tree.path_of(new_parent)?.join(new_name)?;
        let existing = self.tree.child(new_parent, new_name)?;
        let object_type = self.tree.node(source)?.object_type();

        if object_type == ObjectType::Directory && self.tree.is_ancestor(source, new_parent) {
            return Err(FsError::InvalidPath(to.to_string()));
        }

        if let Some(target) = existing {
            if target == source {
                return Ok(());
            }
            if !replace {
                return Err(FsError::AlreadyExists(to.to_string()));
            }
            let target_node = self.tree.node(target)?;
            match (object_type, target_node.children()) {
                (ObjectType::File, Some(_)) => {
                    return Err(FsError::IsADirectory(to.to_string()));
                }
                (ObjectType::Directory, None) => {
                    return Err(FsError::NotADirectory(to.to_string()));
                }
                (ObjectType::Directory, Some(children)) if !children.is_empty() => {
                    return Err(FsError::NotEmpty(to.to_string()));
                }
                _ => {}
            }
            self.remove(target, false)?;
        }

        let old_parent = self.tree.node_mut(parent)?;
        if let Some(children) = old_parent.children_mut() {
            children.shift_remove(name);
        }
        old_parent.touch();

        let new_parent_node = self.tree.node_mut(new_parent)?;
        if let Some(children) = new_parent_node.children_mut() {
            children.insert(new_name.to_string(), source);
        }
        new_parent_node.touch();

        let link_seq = self.tree.next_link_seq();
        let node = self.tree.node_mut(source)?;
        node.name = new_name.to_string();
        node.parent = Some(new_parent);
        node.link_seq = link_seq;
        node.changed = SystemTime::now();

        tracing::debug!(from = %from, to = %to, inode = source, "node renamed");
        self.events.push(Event::renamed(from, to, object_type));
        Ok(())
    }
}
