//! Mount lifecycle controller
//!
//! Owns the single kernel session of a filesystem. Lifecycle state sits behind
//! one mutex that is never held across an await or a kernel call; the blocking
//! attach and detach work runs on tokio's blocking pool and records its own
//! outcome, so a caller dropping the future cannot strand the state machine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use common::{FsError, NodeStore};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use super::{
    KernelSession, MountBackend, MountError, MountStatus, SessionContext, SessionGate,
    SessionOptions,
};

#[derive(Debug, Clone)]
pub struct MountManagerConfig {
    pub options: SessionOptions,
    /// How long unmount waits for in-flight kernel requests before detaching anyway
    pub drain_timeout: Duration,
}

/// Public description of the current mount
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountInfo {
    pub session_id: Uuid,
    pub mount_point: PathBuf,
    pub capacity_bytes: u64,
    pub mounted_at: SystemTime,
}

/// An attached session and the bookkeeping needed to tear it down
pub struct LiveMount {
    info: MountInfo,
    gate: Arc<SessionGate>,
    session: Box<dyn KernelSession>,
}

impl LiveMount {
    pub fn info(&self) -> &MountInfo {
        &self.info
    }
}

impl std::fmt::Debug for LiveMount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveMount")
            .field("info", &self.info)
            .field("in_flight", &self.gate.in_flight())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum Lifecycle {
    Unattached,
    Attaching,
    Attached(LiveMount),
    Detaching,
}

impl Lifecycle {
    fn status(&self) -> MountStatus {
        match self {
            Lifecycle::Unattached => MountStatus::Unattached,
            Lifecycle::Attaching => MountStatus::Attaching,
            Lifecycle::Attached(_) => MountStatus::Attached,
            Lifecycle::Detaching => MountStatus::Detaching,
        }
    }
}

pub struct MountManager {
    backend: Arc<dyn MountBackend>,
    store: Arc<NodeStore>,
    config: MountManagerConfig,
    lifecycle: Arc<Mutex<Lifecycle>>,
}

impl MountManager {
    pub fn new(
        backend: Arc<dyn MountBackend>,
        store: Arc<NodeStore>,
        config: MountManagerConfig,
    ) -> Self {
        Self {
            backend,
            store,
            config,
            lifecycle: Arc::new(Mutex::new(Lifecycle::Unattached)),
        }
    }

    pub fn status(&self) -> MountStatus {
        self.lifecycle.lock().status()
    }

    pub fn info(&self) -> Option<MountInfo> {
        match &*self.lifecycle.lock() {
            Lifecycle::Attached(live) => Some(live.info.clone()),
            _ => None,
        }
    }

    /// Attach the store at `mount_point` with the given capacity (0 selects the default)
    ///
    /// The tree is not touched: everything added before the mount is visible
    /// to the kernel as soon as this returns.
    pub async fn mount(
        &self,
        mount_point: impl AsRef<Path>,
        capacity_bytes: u64,
    ) -> Result<MountInfo, MountError> {
        let mount_point = mount_point.as_ref().to_path_buf();
        {
            let mut lifecycle = self.lifecycle.lock();
            match &*lifecycle {
                Lifecycle::Unattached => {}
                Lifecycle::Attached(live) => {
                    return Err(MountError::AlreadyMounted(live.info.mount_point.clone()))
                }
                other => return Err(MountError::Busy(other.status())),
            }
            *lifecycle = Lifecycle::Attaching;
        }

        let lifecycle = self.lifecycle.clone();
        let backend = self.backend.clone();
        let store = self.store.clone();
        let options = self.config.options.clone();

        let task = tokio::task::spawn_blocking(move || {
            let result = attach(backend.as_ref(), store, mount_point, capacity_bytes, options);
            let mut state = lifecycle.lock();
            match result {
                Ok(live) => {
                    let info = live.info.clone();
                    *state = Lifecycle::Attached(live);
                    Ok(info)
                }
                Err(e) => {
                    *state = Lifecycle::Unattached;
                    Err(e)
                }
            }
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                *self.lifecycle.lock() = Lifecycle::Unattached;
                Err(MountError::MountFailed(format!("mount task failed: {}", e)))
            }
        }
    }

    /// Stop serving kernel requests and detach
    ///
    /// New requests are refused from the moment this is called; requests
    /// already running are allowed to finish before the session is torn down.
    /// The tree is left exactly as it was.
    pub async fn unmount(&self) -> Result<(), MountError> {
        let live = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Detaching) {
                Lifecycle::Attached(live) => live,
                Lifecycle::Unattached => {
                    *lifecycle = Lifecycle::Unattached;
                    return Err(MountError::NotMounted);
                }
                other => {
                    let status = other.status();
                    *lifecycle = other;
                    return Err(MountError::Busy(status));
                }
            }
        };

        live.gate.close();
        tracing::info!(
            session_id = %live.info.session_id,
            mount_point = %live.info.mount_point.display(),
            in_flight = live.gate.in_flight(),
            "unmounting"
        );

        let lifecycle = self.lifecycle.clone();
        let drain_timeout = self.config.drain_timeout;
        let task = tokio::task::spawn_blocking(move || {
            let LiveMount {
                info,
                gate,
                session,
            } = live;
            if !gate.wait_idle(drain_timeout) {
                tracing::warn!(
                    session_id = %info.session_id,
                    in_flight = gate.in_flight(),
                    "in-flight requests did not drain in {:?}, detaching anyway",
                    drain_timeout
                );
            }
            session.detach();
            *lifecycle.lock() = Lifecycle::Unattached;
            tracing::info!(
                session_id = %info.session_id,
                mount_point = %info.mount_point.display(),
                "unmounted"
            );
        });

        task.await.map_err(|e| {
            *self.lifecycle.lock() = Lifecycle::Unattached;
            MountError::UnmountFailed(format!("unmount task failed: {}", e))
        })
    }
}

impl std::fmt::Debug for MountManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountManager")
            .field("status", &self.status())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn attach(
    backend: &dyn MountBackend,
    store: Arc<NodeStore>,
    mount_point: PathBuf,
    capacity_bytes: u64,
    options: SessionOptions,
) -> Result<LiveMount, MountError> {
    validate_mount_point(&mount_point)?;

    let previous_capacity = store.space().capacity();
    store
        .configure_capacity(capacity_bytes)
        .map_err(|e| match e {
            FsError::CapacityExceeded {
                requested,
                available,
            } => MountError::InsufficientCapacity {
                used: requested,
                capacity: available,
            },
            other => MountError::MountFailed(other.to_string()),
        })?;
    let capacity_bytes = store.space().capacity();

    let session_id = Uuid::new_v4();
    let gate = SessionGate::new();
    let ctx = SessionContext {
        session_id,
        mount_point: mount_point.clone(),
        store: store.clone(),
        gate: gate.clone(),
        options,
    };

    tracing::info!(
        %session_id,
        mount_point = %mount_point.display(),
        capacity_bytes,
        "mounting"
    );

    let session = backend.attach(ctx).map_err(|e| {
        store.space().set_capacity(previous_capacity);
        tracing::error!(
            %session_id,
            mount_point = %mount_point.display(),
            "mount failed: {}",
            e
        );
        MountError::MountFailed(e.to_string())
    })?;

    tracing::info!(%session_id, mount_point = %mount_point.display(), "mounted");

    Ok(LiveMount {
        info: MountInfo {
            session_id,
            mount_point,
            capacity_bytes,
            mounted_at: SystemTime::now(),
        },
        gate,
        session,
    })
}

fn validate_mount_point(path: &Path) -> Result<(), MountError> {
    let invalid = |reason: String| MountError::InvalidMountPoint {
        path: path.to_path_buf(),
        reason,
    };
    let metadata = std::fs::metadata(path).map_err(|e| invalid(e.to_string()))?;
    if !metadata.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    Ok(())
}
