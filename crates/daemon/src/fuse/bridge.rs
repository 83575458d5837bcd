//! Kernel request handling, independent of the fuser reply types
//!
//! Each method takes the arguments of one FUSE operation and returns either
//! the reply payload or an errno. [`super::MemoryFs`] only adapts these to
//! fuser's reply objects, which keeps the request logic testable without a
//! kernel session.

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use common::{FsError, Inode, NodeStore, MAX_NAME_LEN};
use fuser::{FileAttr, FileType, TimeOrNow};
use libc::c_int;

use super::convert::{errno, file_type, resolve_time, to_file_attr, STATFS_BLOCK_SIZE};

#[cfg(target_os = "linux")]
const RENAME_NOREPLACE: u32 = libc::RENAME_NOREPLACE as u32;
#[cfg(target_os = "linux")]
const RENAME_EXCHANGE: u32 = libc::RENAME_EXCHANGE as u32;
#[cfg(not(target_os = "linux"))]
const RENAME_NOREPLACE: u32 = 0;
#[cfg(not(target_os = "linux"))]
const RENAME_EXCHANGE: u32 = 0;

pub type BridgeResult<T> = Result<T, c_int>;

const DOT_COOKIE: u64 = 1;
const DOTDOT_COOKIE: u64 = 2;

/// One entry of a readdir reply; `offset` is the cookie of the next entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirSlot {
    pub ino: u64,
    pub offset: i64,
    pub kind: FileType,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatFs {
    pub blocks: u64,
    pub bfree: u64,
    pub bavail: u64,
    pub files: u64,
    pub ffree: u64,
    pub bsize: u32,
    pub namelen: u32,
    pub frsize: u32,
}

pub struct Bridge {
    store: Arc<NodeStore>,
    ttl: Duration,
    uid: u32,
    gid: u32,
}

impl Bridge {
    /// Nodes are reported as owned by the user running the process
    pub fn new(store: Arc<NodeStore>, ttl: Duration) -> Self {
        // SAFETY: getuid and getgid cannot fail and touch no memory
        let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
        Self::with_owner(store, ttl, uid, gid)
    }

    pub fn with_owner(store: Arc<NodeStore>, ttl: Duration, uid: u32, gid: u32) -> Self {
        Self {
            store,
            ttl,
            uid,
            gid,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn store(&self) -> &Arc<NodeStore> {
        &self.store
    }

    pub fn lookup(&self, parent: Inode, name: &OsStr) -> BridgeResult<FileAttr> {
        let name = utf8_name(name)?;
        let attr = self.store.lookup(parent, name).map_err(|e| fail(&e))?;
        Ok(self.file_attr(&attr))
    }

    pub fn getattr(&self, ino: Inode) -> BridgeResult<FileAttr> {
        let attr = self.store.attr(ino).map_err(|e| fail(&e))?;
        Ok(self.file_attr(&attr))
    }

    /// Truncate/extend and timestamp updates; mode and ownership changes are ignored
    pub fn setattr(
        &self,
        ino: Inode,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
    ) -> BridgeResult<FileAttr> {
        let mut attr = None;
        if let Some(size) = size {
            attr = Some(self.store.set_len(ino, size).map_err(|e| fail(&e))?);
        }
        if atime.is_some() || mtime.is_some() {
            attr = Some(
                self.store
                    .set_times(ino, atime.map(resolve_time), mtime.map(resolve_time))
                    .map_err(|e| fail(&e))?,
            );
        }
        match attr {
            Some(attr) => Ok(self.file_attr(&attr)),
            None => self.getattr(ino),
        }
    }

    pub fn open(&self, ino: Inode) -> BridgeResult<()> {
        self.store.attr(ino).map(|_| ()).map_err(|e| fail(&e))
    }

    pub fn opendir(&self, ino: Inode) -> BridgeResult<()> {
        let attr = self.store.attr(ino).map_err(|e| fail(&e))?;
        if !attr.is_dir() {
            return Err(libc::ENOTDIR);
        }
        Ok(())
    }

    pub fn read(&self, ino: Inode, offset: i64, size: u32) -> BridgeResult<Vec<u8>> {
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;
        self.store
            .read_at(ino, offset, size as usize)
            .map_err(|e| fail(&e))
    }

    pub fn write(&self, ino: Inode, offset: i64, data: &[u8]) -> BridgeResult<u32> {
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;
        let written = self
            .store
            .write_at(ino, offset, data)
            .map_err(|e| fail(&e))?;
        u32::try_from(written).map_err(|_| libc::EINVAL)
    }

    /// Entries after the cookie `offset`, `.` and `..` included
    ///
    /// `.` and `..` take cookies 1 and 2; a child's cookie is its link stamp
    /// plus 2. Stamps are never reused, so removing entries between two calls
    /// does not shift the resume point.
    pub fn readdir(&self, ino: Inode, offset: i64) -> BridgeResult<Vec<DirSlot>> {
        let offset = u64::try_from(offset).map_err(|_| libc::EINVAL)?;
        let listing = self.store.list_ino(ino).map_err(|e| fail(&e))?;

        let fixed = [
            (listing.inode, FileType::Directory, ".", DOT_COOKIE),
            (listing.parent, FileType::Directory, "..", DOTDOT_COOKIE),
        ];
        let children = listing.after(offset.saturating_sub(DOTDOT_COOKIE)).map(|entry| {
            (
                entry.inode,
                file_type(entry.kind),
                entry.name.as_str(),
                entry.seq + DOTDOT_COOKIE,
            )
        });

        fixed
            .into_iter()
            .filter(|(_, _, _, cookie)| *cookie > offset)
            .chain(children)
            .map(|(ino, kind, name, cookie)| {
                Ok(DirSlot {
                    ino,
                    offset: i64::try_from(cookie).map_err(|_| libc::EOVERFLOW)?,
                    kind,
                    name: name.to_string(),
                })
            })
            .collect()
    }

    pub fn create(&self, parent: Inode, name: &OsStr) -> BridgeResult<FileAttr> {
        let name = utf8_name(name)?;
        let attr = self
            .store
            .create_file_in(parent, name)
            .map_err(|e| fail(&e))?;
        Ok(self.file_attr(&attr))
    }

    pub fn mkdir(&self, parent: Inode, name: &OsStr) -> BridgeResult<FileAttr> {
        let name = utf8_name(name)?;
        let attr = self.store.mkdir_in(parent, name).map_err(|e| fail(&e))?;
        Ok(self.file_attr(&attr))
    }

    pub fn unlink(&self, parent: Inode, name: &OsStr) -> BridgeResult<()> {
        let name = utf8_name(name)?;
        self.store.unlink_in(parent, name).map_err(|e| fail(&e))
    }

    pub fn rmdir(&self, parent: Inode, name: &OsStr) -> BridgeResult<()> {
        let name = utf8_name(name)?;
        self.store.rmdir_in(parent, name).map_err(|e| fail(&e))
    }

    /// POSIX rename; `RENAME_NOREPLACE` is honored and `RENAME_EXCHANGE` refused
    pub fn rename(
        &self,
        parent: Inode,
        name: &OsStr,
        new_parent: Inode,
        new_name: &OsStr,
        flags: u32,
    ) -> BridgeResult<()> {
        if flags & RENAME_EXCHANGE != 0 {
            return Err(libc::EINVAL);
        }
        let name = utf8_name(name)?;
        let new_name = utf8_name(new_name)?;
        let replace = flags & RENAME_NOREPLACE == 0;
        self.store
            .rename_in(parent, name, new_parent, new_name, replace)
            .map_err(|e| fail(&e))
    }

    pub fn statfs(&self) -> StatFs {
        let usage = self.store.usage();
        let block = STATFS_BLOCK_SIZE as u64;
        let free = usage.available_bytes() / block;
        StatFs {
            blocks: usage.capacity_bytes / block,
            bfree: free,
            bavail: free,
            files: usage.max_nodes,
            ffree: usage.max_nodes.saturating_sub(usage.nodes),
            bsize: STATFS_BLOCK_SIZE,
            namelen: MAX_NAME_LEN as u32,
            frsize: STATFS_BLOCK_SIZE,
        }
    }

    fn file_attr(&self, attr: &common::NodeAttr) -> FileAttr {
        to_file_attr(attr, self.uid, self.gid)
    }
}

fn utf8_name(name: &OsStr) -> BridgeResult<&str> {
    name.to_str().ok_or(libc::EINVAL)
}

fn fail(err: &FsError) -> c_int {
    let code = errno(err);
    tracing::debug!(kind = err.kind(), errno = code, "request failed: {}", err);
    code
}
