//! Kernel sessions backed by fuser

use std::panic::{catch_unwind, AssertUnwindSafe};

use fuser::{BackgroundSession, MountOption};
use uuid::Uuid;

use super::{Bridge, MemoryFs};
use crate::mount::{KernelSession, MountBackend, SessionContext};

/// Mounts through `/dev/fuse` with fuser's background session
#[derive(Debug, Default, Clone, Copy)]
pub struct FuseBackend;

impl MountBackend for FuseBackend {
    fn attach(&self, ctx: SessionContext) -> std::io::Result<Box<dyn KernelSession>> {
        let bridge = Bridge::new(ctx.store.clone(), ctx.options.attr_ttl);
        let fs = MemoryFs::new(bridge, ctx.gate.clone(), ctx.session_id);

        let mut options = vec![
            MountOption::FSName(ctx.options.fs_name.clone()),
            MountOption::DefaultPermissions,
        ];
        if ctx.options.auto_unmount {
            options.push(MountOption::AutoUnmount);
        }
        if ctx.options.allow_other {
            options.push(MountOption::AllowOther);
        }

        let session = fuser::spawn_mount2(fs, &ctx.mount_point, &options)?;
        Ok(Box::new(FuseSession {
            session,
            session_id: ctx.session_id,
        }))
    }
}

struct FuseSession {
    session: BackgroundSession,
    session_id: Uuid,
}

impl KernelSession for FuseSession {
    fn detach(self: Box<Self>) {
        let FuseSession {
            session,
            session_id,
        } = *self;
        // join unmounts, then waits for the request loop; it panics if the
        // loop itself ended with an error
        if let Err(panic) = catch_unwind(AssertUnwindSafe(move || session.join())) {
            let message = panic
                .downcast_ref::<String>()
                .map(String::as_str)
                .or_else(|| panic.downcast_ref::<&str>().copied())
                .unwrap_or("unknown panic");
            tracing::error!(%session_id, "FUSE session ended with an error: {}", message);
        }
    }
}
