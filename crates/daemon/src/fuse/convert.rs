//! Conversions between store types and their kernel representation

use std::time::SystemTime;

use common::{FsError, NodeAttr, ObjectType};
use fuser::{FileAttr, FileType};
use libc::c_int;

/// Unit of `st_blocks`
pub const BLOCK_SIZE: u32 = 512;
/// Block size reported by statfs
pub const STATFS_BLOCK_SIZE: u32 = 4096;

pub const FILE_PERM: u16 = 0o644;
pub const DIR_PERM: u16 = 0o755;

pub fn file_type(kind: ObjectType) -> FileType {
    match kind {
        ObjectType::File => FileType::RegularFile,
        ObjectType::Directory => FileType::Directory,
    }
}

pub fn to_file_attr(attr: &NodeAttr, uid: u32, gid: u32) -> FileAttr {
    let perm = match attr.kind {
        ObjectType::File => FILE_PERM,
        ObjectType::Directory => DIR_PERM,
    };
    FileAttr {
        ino: attr.inode,
        size: attr.size,
        blocks: attr.size.div_ceil(BLOCK_SIZE as u64),
        atime: attr.accessed,
        mtime: attr.modified,
        ctime: attr.changed,
        crtime: attr.created,
        kind: file_type(attr.kind),
        perm,
        nlink: attr.nlink,
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

pub fn errno(err: &FsError) -> c_int {
    match err {
        FsError::NotFound(_) => libc::ENOENT,
        FsError::AlreadyExists(_) => libc::EEXIST,
        FsError::NotADirectory(_) => libc::ENOTDIR,
        FsError::IsADirectory(_) => libc::EISDIR,
        FsError::NotEmpty(_) => libc::ENOTEMPTY,
        FsError::CapacityExceeded { .. } | FsError::NodeLimitReached(_) => libc::ENOSPC,
        FsError::InvalidPath(_) => libc::EINVAL,
        FsError::NameTooLong(_) => libc::ENAMETOOLONG,
    }
}

pub fn resolve_time(time: fuser::TimeOrNow) -> SystemTime {
    match time {
        fuser::TimeOrNow::SpecificTime(t) => t,
        fuser::TimeOrNow::Now => SystemTime::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(kind: ObjectType, size: u64) -> NodeAttr {
        let now = SystemTime::now();
        NodeAttr {
            inode: 7,
            kind,
            name: "sample".to_string(),
            size,
            nlink: if kind == ObjectType::Directory { 2 } else { 1 },
            created: now,
            modified: now,
            accessed: now,
            changed: now,
        }
    }

    #[test]
    fn test_file_attr() {
        let attr = to_file_attr(&sample(ObjectType::File, 1025), 1000, 100);
        assert_eq!(attr.ino, 7);
        assert_eq!(attr.kind, FileType::RegularFile);
        assert_eq!(attr.perm, 0o644);
        assert_eq!(attr.size, 1025);
        assert_eq!(attr.blocks, 3);
        assert_eq!(attr.nlink, 1);
        assert_eq!((attr.uid, attr.gid), (1000, 100));
    }

    #[test]
    fn test_dir_attr() {
        let attr = to_file_attr(&sample(ObjectType::Directory, 0), 0, 0);
        assert_eq!(attr.kind, FileType::Directory);
        assert_eq!(attr.perm, 0o755);
        assert_eq!(attr.blocks, 0);
        assert_eq!(attr.nlink, 2);
    }

    #[test]
    fn test_errno_mapping() {
        let cases = [
            (FsError::NotFound("/a".into()), libc::ENOENT),
            (FsError::AlreadyExists("/a".into()), libc::EEXIST),
            (FsError::NotADirectory("/a".into()), libc::ENOTDIR),
            (FsError::IsADirectory("/a".into()), libc::EISDIR),
            (FsError::NotEmpty("/a".into()), libc::ENOTEMPTY),
            (
                FsError::CapacityExceeded {
                    requested: 1,
                    available: 0,
                },
                libc::ENOSPC,
            ),
            (FsError::NodeLimitReached(4), libc::ENOSPC),
            (FsError::InvalidPath("/a/..".into()), libc::EINVAL),
            (FsError::NameTooLong("x".into()), libc::ENAMETOOLONG),
        ];
        for (err, code) in cases {
            assert_eq!(errno(&err), code, "{:?}", err);
        }
    }
}
