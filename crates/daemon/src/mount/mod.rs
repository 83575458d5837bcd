//! Mount lifecycle: attaching the node store to the kernel and detaching it
//!
//! - `MountManager`: the Unattached/Attaching/Attached/Detaching state machine
//! - `MountBackend` / `KernelSession`: the kernel seam (FUSE in production)
//! - `SessionGate`: refuses kernel requests during teardown and drains the rest

mod backend;
mod error;
mod gate;
mod manager;
mod status;

pub use backend::{KernelSession, MountBackend, SessionContext, SessionOptions};
pub use error::MountError;
pub use gate::{CallGuard, SessionGate};
pub use manager::{LiveMount, MountInfo, MountManager, MountManagerConfig};
pub use status::MountStatus;
