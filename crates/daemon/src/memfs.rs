//! Host-facing API
//!
//! [`MemFs`] bundles a node store, its event bus and a mount controller. The
//! tree can be edited before, during and after a mount; edits made while
//! mounted are visible to the kernel on its next request.

use std::path::Path;
use std::sync::Arc;

use common::{DirListing, Event, NodeAttr, NodeStore, SubscriptionHandle, Usage};

use crate::config::{Config, ParentPolicy};
use crate::error::Result;
use crate::mount::{MountBackend, MountInfo, MountManager, MountManagerConfig, MountStatus};

pub struct MemFs {
    store: Arc<NodeStore>,
    mounts: MountManager,
    parent_policy: ParentPolicy,
    default_capacity: u64,
}

impl MemFs {
    /// A filesystem that mounts through FUSE
    #[cfg(feature = "fuse")]
    pub fn new(config: Config) -> Self {
        Self::with_backend(config, crate::fuse::FuseBackend)
    }

    pub fn with_backend(config: Config, backend: impl MountBackend) -> Self {
        let store = Arc::new(NodeStore::new(config.capacity_bytes, config.max_nodes));
        let mounts = MountManager::new(
            Arc::new(backend),
            store.clone(),
            MountManagerConfig {
                options: config.session_options(),
                drain_timeout: config.drain_timeout(),
            },
        );
        Self {
            store,
            mounts,
            parent_policy: config.parent_policy,
            default_capacity: config.capacity_bytes,
        }
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    // ========================================
    // Lifecycle
    // ========================================

    /// Expose the tree at `mount_point`
    ///
    /// `total_space_bytes` of 0 uses the configured capacity.
    pub async fn mount(
        &self,
        mount_point: impl AsRef<Path>,
        total_space_bytes: u64,
    ) -> Result<MountInfo> {
        let capacity = if total_space_bytes == 0 {
            self.default_capacity
        } else {
            total_space_bytes
        };
        Ok(self.mounts.mount(mount_point, capacity).await?)
    }

    pub async fn unmount(&self) -> Result<()> {
        Ok(self.mounts.unmount().await?)
    }

    pub fn status(&self) -> MountStatus {
        self.mounts.status()
    }

    pub fn mount_info(&self) -> Option<MountInfo> {
        self.mounts.info()
    }

    // ========================================
    // Tree mutation
    // ========================================

    /// Create a file with `content`; fails if anything already exists at `path`
    pub async fn add_file(&self, path: &str, content: impl Into<Vec<u8>>) -> Result<()> {
        self.ensure_parent(path)?;
        self.store.insert_file(path, content)?;
        Ok(())
    }

    /// Create an empty directory; fails if anything already exists at `path`
    pub async fn add_directory(&self, path: &str) -> Result<()> {
        self.ensure_parent(path)?;
        self.store.insert_directory(path)?;
        Ok(())
    }

    /// Remove a file, or a directory with everything under it
    pub async fn remove_path(&self, path: &str) -> Result<()> {
        Ok(self.store.remove(path, true)?)
    }

    /// Swap a file's whole content in one step
    pub async fn replace_file(&self, path: &str, content: impl Into<Vec<u8>>) -> Result<()> {
        Ok(self.store.replace_content(path, content)?)
    }

    // ========================================
    // Queries
    // ========================================

    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        Ok(self.store.read_all(path)?)
    }

    pub async fn list(&self, path: &str) -> Result<DirListing> {
        Ok(self.store.list(path)?)
    }

    pub async fn stat(&self, path: &str) -> Result<NodeAttr> {
        Ok(self.store.resolve(path)?)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.store.exists(path)
    }

    pub fn usage(&self) -> Usage {
        self.store.usage()
    }

    // ========================================
    // Events
    // ========================================

    /// Call `callback` for every change, in commit order
    ///
    /// The callback runs synchronously after the change is visible; errors
    /// and panics inside it are logged and never reach the mutating caller.
    pub fn on<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        self.store.events().subscribe(callback)
    }

    pub fn off(&self, handle: SubscriptionHandle) -> bool {
        self.store.events().unsubscribe(handle)
    }

    /// Receive every change on a channel instead of a callback
    pub fn events(&self) -> (SubscriptionHandle, flume::Receiver<Event>) {
        self.store.events().subscribe_channel()
    }

    fn ensure_parent(&self, path: &str) -> Result<()> {
        if self.parent_policy == ParentPolicy::CreateMissing {
            let parent = common::PathKey::parse(path)?.parent();
            if !parent.is_root() {
                self.store.create_dir_all(parent.as_str())?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for MemFs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemFs")
            .field("status", &self.status())
            .field("usage", &self.usage())
            .field("parent_policy", &self.parent_policy)
            .finish_non_exhaustive()
    }
}
