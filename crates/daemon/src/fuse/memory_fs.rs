//! fuser adapter over [`Bridge`]

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::SystemTime;

use fuser::{
    FileAttr, Filesystem, KernelConfig, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, ReplyWrite, Request, TimeOrNow,
};
use libc::c_int;
use uuid::Uuid;

use super::bridge::{Bridge, BridgeResult};
use crate::mount::{CallGuard, SessionGate};

/// The filesystem handed to fuser for one session
///
/// Every callback enters the session gate first; once unmount has closed the
/// gate, requests are answered with `EIO` without touching the store.
pub struct MemoryFs {
    bridge: Bridge,
    gate: Arc<SessionGate>,
    session_id: Uuid,
}

impl MemoryFs {
    pub fn new(bridge: Bridge, gate: Arc<SessionGate>, session_id: Uuid) -> Self {
        Self {
            bridge,
            gate,
            session_id,
        }
    }

    fn admit(&self, op: &'static str) -> Option<CallGuard> {
        let guard = self.gate.enter();
        if guard.is_none() {
            tracing::debug!(session_id = %self.session_id, op, "refusing request during unmount");
        }
        guard
    }

    fn reply_entry(&self, result: BridgeResult<FileAttr>, reply: ReplyEntry) {
        match result {
            Ok(attr) => reply.entry(&self.bridge.ttl(), &attr, 0),
            Err(code) => reply.error(code),
        }
    }

    fn reply_empty(result: BridgeResult<()>, reply: ReplyEmpty) {
        match result {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }
}

impl Filesystem for MemoryFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        tracing::info!(session_id = %self.session_id, "FUSE session initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        tracing::info!(session_id = %self.session_id, "FUSE session destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(_call) = self.admit("lookup") else {
            return reply.error(libc::EIO);
        };
        let result = self.bridge.lookup(parent, name);
        self.reply_entry(result, reply);
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        let Some(_call) = self.admit("getattr") else {
            return reply.error(libc::EIO);
        };
        match self.bridge.getattr(ino) {
            Ok(attr) => reply.attr(&self.bridge.ttl(), &attr),
            Err(code) => reply.error(code),
        }
    }

    fn setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        let Some(_call) = self.admit("setattr") else {
            return reply.error(libc::EIO);
        };
        match self.bridge.setattr(ino, size, atime, mtime) {
            Ok(attr) => reply.attr(&self.bridge.ttl(), &attr),
            Err(code) => reply.error(code),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(_call) = self.admit("open") else {
            return reply.error(libc::EIO);
        };
        match self.bridge.open(ino) {
            Ok(()) => reply.opened(0, 0),
            Err(code) => reply.error(code),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        let Some(_call) = self.admit("opendir") else {
            return reply.error(libc::EIO);
        };
        match self.bridge.opendir(ino) {
            Ok(()) => reply.opened(0, 0),
            Err(code) => reply.error(code),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(_call) = self.admit("read") else {
            return reply.error(libc::EIO);
        };
        match self.bridge.read(ino, offset, size) {
            Ok(data) => reply.data(&data),
            Err(code) => reply.error(code),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(_call) = self.admit("write") else {
            return reply.error(libc::EIO);
        };
        match self.bridge.write(ino, offset, data) {
            Ok(written) => reply.written(written),
            Err(code) => reply.error(code),
        }
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        let Some(_call) = self.admit("flush") else {
            return reply.error(libc::EIO);
        };
        Self::reply_empty(self.bridge.open(ino), reply);
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        // Nothing is held per handle
        reply.ok();
    }

    fn fsync(&mut self, _req: &Request<'_>, ino: u64, _fh: u64, _datasync: bool, reply: ReplyEmpty) {
        let Some(_call) = self.admit("fsync") else {
            return reply.error(libc::EIO);
        };
        Self::reply_empty(self.bridge.open(ino), reply);
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(_call) = self.admit("readdir") else {
            return reply.error(libc::EIO);
        };
        match self.bridge.readdir(ino, offset) {
            Ok(slots) => {
                for slot in slots {
                    // true means the reply buffer is full
                    if reply.add(slot.ino, slot.offset, slot.kind, &slot.name) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(code) => reply.error(code),
        }
    }

    fn create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        let Some(_call) = self.admit("create") else {
            return reply.error(libc::EIO);
        };
        match self.bridge.create(parent, name) {
            Ok(attr) => reply.created(&self.bridge.ttl(), &attr, 0, 0, 0),
            Err(code) => reply.error(code),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(_call) = self.admit("mkdir") else {
            return reply.error(libc::EIO);
        };
        let result = self.bridge.mkdir(parent, name);
        self.reply_entry(result, reply);
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(_call) = self.admit("unlink") else {
            return reply.error(libc::EIO);
        };
        Self::reply_empty(self.bridge.unlink(parent, name), reply);
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(_call) = self.admit("rmdir") else {
            return reply.error(libc::EIO);
        };
        Self::reply_empty(self.bridge.rmdir(parent, name), reply);
    }

    fn rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        flags: u32,
        reply: ReplyEmpty,
    ) {
        let Some(_call) = self.admit("rename") else {
            return reply.error(libc::EIO);
        };
        Self::reply_empty(
            self.bridge.rename(parent, name, newparent, newname, flags),
            reply,
        );
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let Some(_call) = self.admit("statfs") else {
            return reply.error(libc::EIO);
        };
        let s = self.bridge.statfs();
        reply.statfs(
            s.blocks, s.bfree, s.bavail, s.files, s.ffree, s.bsize, s.namelen, s.frsize,
        );
    }
}
