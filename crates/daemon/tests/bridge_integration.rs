//! Integration tests for the kernel bridge
//!
//! The backend here builds the same `Bridge` the FUSE backend would, then
//! hands it to the test instead of to `/dev/fuse`. Requests are issued the
//! way the kernel issues them: by inode, with raw names and offsets.

#![cfg(feature = "fuse")]

use std::ffi::OsStr;
use std::sync::Arc;

use parking_lot::Mutex;
use tempfile::TempDir;

use memfs_daemon::fuse::Bridge;
use memfs_daemon::mount::{KernelSession, SessionContext};
use memfs_daemon::{Config, EventKind, MemFs, MountBackend, ObjectType, ROOT_INODE};

#[derive(Clone, Default)]
struct CapturingBackend(Arc<Mutex<Option<Arc<Bridge>>>>);

impl MountBackend for CapturingBackend {
    fn attach(&self, ctx: SessionContext) -> std::io::Result<Box<dyn KernelSession>> {
        let bridge = Bridge::new(ctx.store.clone(), ctx.options.attr_ttl);
        *self.0.lock() = Some(Arc::new(bridge));
        Ok(Box::new(NoopSession))
    }
}

struct NoopSession;

impl KernelSession for NoopSession {
    fn detach(self: Box<Self>) {}
}

/// Mount a fresh filesystem and return the bridge the kernel would talk to
async fn mounted(capacity: u64) -> (MemFs, Arc<Bridge>, TempDir) {
    let backend = CapturingBackend::default();
    let captured = backend.0.clone();
    let fs = MemFs::with_backend(Config::default(), backend);
    let temp = TempDir::new().unwrap();
    fs.mount(temp.path(), capacity).await.unwrap();
    let bridge = captured.lock().clone().unwrap();
    (fs, bridge, temp)
}

fn name(s: &str) -> &OsStr {
    OsStr::new(s)
}

#[tokio::test]
async fn test_host_file_read_through_kernel() {
    let backend = CapturingBackend::default();
    let captured = backend.0.clone();
    let fs = MemFs::with_backend(Config::default(), backend);
    let temp = TempDir::new().unwrap();

    // Added before the mount exists
    fs.add_file("/hello.txt", "Hello, World!\n").await.unwrap();
    fs.mount(temp.path(), 0).await.unwrap();
    let bridge = captured.lock().clone().unwrap();

    let attr = bridge.lookup(ROOT_INODE, name("hello.txt")).unwrap();
    assert_eq!(attr.size, 14);
    assert_eq!(attr.perm, 0o644);

    let data = bridge.read(attr.ino, 0, 4096).unwrap();
    assert_eq!(data, b"Hello, World!\n");
    assert!(bridge.read(attr.ino, 14, 4096).unwrap().is_empty());
}

#[tokio::test]
async fn test_host_mutations_visible_while_mounted() {
    let (fs, bridge, _temp) = mounted(0).await;
    assert_eq!(
        bridge.lookup(ROOT_INODE, name("late.txt")).unwrap_err(),
        libc::ENOENT
    );

    fs.add_directory("/subdir").await.unwrap();
    fs.add_file("/subdir/test.txt", "Test file in subdir\n")
        .await
        .unwrap();

    let dir = bridge.lookup(ROOT_INODE, name("subdir")).unwrap();
    let names: Vec<_> = bridge
        .readdir(dir.ino, 0)
        .unwrap()
        .into_iter()
        .map(|slot| slot.name)
        .collect();
    assert_eq!(names, vec![".", "..", "test.txt"]);

    fs.replace_file("/subdir/test.txt", "short").await.unwrap();
    let file = bridge.lookup(dir.ino, name("test.txt")).unwrap();
    assert_eq!(bridge.getattr(file.ino).unwrap().size, 5);

    fs.remove_path("/subdir").await.unwrap();
    assert_eq!(
        bridge.lookup(ROOT_INODE, name("subdir")).unwrap_err(),
        libc::ENOENT
    );
    assert_eq!(bridge.getattr(file.ino).unwrap_err(), libc::ENOENT);
    let names: Vec<_> = bridge
        .readdir(ROOT_INODE, 0)
        .unwrap()
        .into_iter()
        .map(|slot| slot.name)
        .collect();
    assert_eq!(names, vec![".", ".."]);
}

#[tokio::test]
async fn test_kernel_changes_reach_host_and_events() {
    let (fs, bridge, _temp) = mounted(0).await;
    let (_handle, events) = fs.events();

    let dir = bridge.mkdir(ROOT_INODE, name("docs")).unwrap();
    let file = bridge.create(dir.ino, name("note.md")).unwrap();
    assert_eq!(bridge.write(file.ino, 0, b"# notes\n").unwrap(), 8);

    assert_eq!(fs.read_file("/docs/note.md").await.unwrap(), b"# notes\n");
    assert_eq!(fs.usage().used_bytes, 8);

    let seen: Vec<_> = events
        .try_iter()
        .map(|e| format!("{} {} {}", e.event_type(), e.path, e.object_type))
        .collect();
    assert_eq!(
        seen,
        vec![
            "created /docs directory",
            "created /docs/note.md file",
            "modified /docs/note.md file",
        ]
    );

    bridge.unlink(dir.ino, name("note.md")).unwrap();
    bridge.rmdir(ROOT_INODE, name("docs")).unwrap();
    assert!(!fs.exists("/docs"));
    assert_eq!(fs.usage().used_bytes, 0);
    assert_eq!(events.try_iter().count(), 2);
}

#[tokio::test]
async fn test_kernel_write_beyond_capacity() {
    let (fs, bridge, _temp) = mounted(10).await;
    let file = bridge.create(ROOT_INODE, name("f")).unwrap();

    assert_eq!(bridge.write(file.ino, 0, &[1u8; 11]), Err(libc::ENOSPC));
    assert_eq!(bridge.getattr(file.ino).unwrap().size, 0);

    assert_eq!(bridge.write(file.ino, 0, &[1u8; 10]).unwrap(), 10);
    assert_eq!(bridge.write(file.ino, 10, &[1u8]), Err(libc::ENOSPC));
    // Overwriting in place needs no new space
    assert_eq!(bridge.write(file.ino, 2, &[9u8; 4]).unwrap(), 4);
    assert_eq!(fs.usage().used_bytes, 10);

    assert_eq!(
        bridge.setattr(file.ino, Some(11), None, None).unwrap_err(),
        libc::ENOSPC
    );
    let attr = bridge.setattr(file.ino, Some(3), None, None).unwrap();
    assert_eq!(attr.size, 3);
    assert_eq!(fs.usage().used_bytes, 3);
}

#[tokio::test]
async fn test_kernel_error_codes() {
    let (fs, bridge, _temp) = mounted(0).await;
    fs.add_directory("/full").await.unwrap();
    fs.add_file("/full/inner", "x").await.unwrap();
    fs.add_file("/plain", "y").await.unwrap();

    let full = bridge.lookup(ROOT_INODE, name("full")).unwrap();
    let plain = bridge.lookup(ROOT_INODE, name("plain")).unwrap();

    assert_eq!(bridge.rmdir(ROOT_INODE, name("full")), Err(libc::ENOTEMPTY));
    assert_eq!(bridge.unlink(ROOT_INODE, name("full")), Err(libc::EISDIR));
    assert_eq!(bridge.rmdir(ROOT_INODE, name("plain")), Err(libc::ENOTDIR));
    assert_eq!(
        bridge.lookup(plain.ino, name("x")).unwrap_err(),
        libc::ENOTDIR
    );
    assert_eq!(bridge.mkdir(ROOT_INODE, name("full")).unwrap_err(), libc::EEXIST);
    assert_eq!(bridge.create(ROOT_INODE, name("plain")).unwrap_err(), libc::EEXIST);
    assert_eq!(bridge.read(full.ino, 0, 16), Err(libc::EISDIR));
    assert_eq!(bridge.write(full.ino, 0, b"z"), Err(libc::EISDIR));
    assert_eq!(
        bridge.setattr(full.ino, Some(0), None, None).unwrap_err(),
        libc::EISDIR
    );

    let long = "n".repeat(256);
    assert_eq!(
        bridge.create(ROOT_INODE, name(&long)).unwrap_err(),
        libc::ENAMETOOLONG
    );

    // Failed requests leave the tree untouched
    assert!(fs.exists("/full/inner"));
    assert_eq!(fs.read_file("/plain").await.unwrap(), b"y");
}

#[tokio::test]
async fn test_kernel_rename() {
    let (fs, bridge, _temp) = mounted(0).await;
    fs.add_file("/a.txt", "aaa").await.unwrap();
    fs.add_file("/b.txt", "b").await.unwrap();
    fs.add_directory("/dir").await.unwrap();
    let dir = bridge.lookup(ROOT_INODE, name("dir")).unwrap();
    let (_handle, events) = fs.events();

    // Plain rename replaces the target and frees its bytes
    bridge
        .rename(ROOT_INODE, name("a.txt"), ROOT_INODE, name("b.txt"), 0)
        .unwrap();
    assert_eq!(fs.read_file("/b.txt").await.unwrap(), b"aaa");
    assert!(!fs.exists("/a.txt"));
    assert_eq!(fs.usage().used_bytes, 3);

    bridge
        .rename(ROOT_INODE, name("b.txt"), dir.ino, name("moved.txt"), 0)
        .unwrap();
    assert_eq!(fs.read_file("/dir/moved.txt").await.unwrap(), b"aaa");

    let seen: Vec<_> = events.try_iter().collect();
    assert_eq!(seen.len(), 3);
    assert_eq!(seen[0].event_type(), "deleted");
    assert_eq!(seen[0].path.as_str(), "/b.txt");
    assert_eq!(
        seen[1].kind,
        EventKind::Renamed {
            from: "/a.txt".parse().unwrap()
        }
    );
    assert_eq!(seen[1].path.as_str(), "/b.txt");
    assert_eq!(seen[2].path.as_str(), "/dir/moved.txt");
    assert_eq!(seen[2].object_type, ObjectType::File);

    // A directory cannot move into itself
    assert_eq!(
        bridge.rename(ROOT_INODE, name("dir"), dir.ino, name("loop"), 0),
        Err(libc::EINVAL)
    );
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_kernel_rename_flags() {
    let (fs, bridge, _temp) = mounted(0).await;
    fs.add_file("/src", "s").await.unwrap();
    fs.add_file("/dst", "d").await.unwrap();

    let noreplace = libc::RENAME_NOREPLACE as u32;
    assert_eq!(
        bridge.rename(ROOT_INODE, name("src"), ROOT_INODE, name("dst"), noreplace),
        Err(libc::EEXIST)
    );
    let exchange = libc::RENAME_EXCHANGE as u32;
    assert_eq!(
        bridge.rename(ROOT_INODE, name("src"), ROOT_INODE, name("dst"), exchange),
        Err(libc::EINVAL)
    );
    assert_eq!(fs.read_file("/dst").await.unwrap(), b"d");

    bridge
        .rename(ROOT_INODE, name("src"), ROOT_INODE, name("fresh"), noreplace)
        .unwrap();
    assert_eq!(fs.read_file("/fresh").await.unwrap(), b"s");
}

#[tokio::test]
async fn test_sparse_write_and_truncate() {
    let (fs, bridge, _temp) = mounted(0).await;
    let file = bridge.create(ROOT_INODE, name("sparse")).unwrap();

    bridge.write(file.ino, 4, b"end").unwrap();
    assert_eq!(fs.read_file("/sparse").await.unwrap(), b"\0\0\0\0end");

    let attr = bridge.setattr(file.ino, Some(10), None, None).unwrap();
    assert_eq!(attr.size, 10);
    assert_eq!(
        bridge.read(file.ino, 4, 100).unwrap(),
        b"end\0\0\0".to_vec()
    );
    assert_eq!(fs.usage().used_bytes, 10);
}

#[tokio::test]
async fn test_statfs_reports_capacity() {
    let (fs, bridge, _temp) = mounted(8192).await;
    fs.add_file("/block", vec![0u8; 4096]).await.unwrap();

    let stats = bridge.statfs();
    assert_eq!(stats.bsize, 4096);
    assert_eq!(stats.blocks, 2);
    assert_eq!(stats.bfree, 1);
    assert_eq!(stats.bavail, 1);
    assert_eq!(stats.namelen, 255);
    assert_eq!(stats.files, fs.usage().max_nodes);
    assert_eq!(stats.ffree, fs.usage().max_nodes - 2);
}

#[tokio::test]
async fn test_directory_attributes() {
    let (fs, bridge, _temp) = mounted(0).await;
    fs.add_directory("/a").await.unwrap();
    fs.add_directory("/b").await.unwrap();
    fs.add_file("/c", "").await.unwrap();

    let root = bridge.getattr(ROOT_INODE).unwrap();
    assert_eq!(root.kind, fuser::FileType::Directory);
    assert_eq!(root.perm, 0o755);
    assert_eq!(root.nlink, 4);

    let slots = bridge.readdir(ROOT_INODE, 0).unwrap();
    let kinds: Vec<_> = slots.iter().map(|s| (s.name.as_str(), s.kind)).collect();
    assert_eq!(
        kinds,
        vec![
            (".", fuser::FileType::Directory),
            ("..", fuser::FileType::Directory),
            ("a", fuser::FileType::Directory),
            ("b", fuser::FileType::Directory),
            ("c", fuser::FileType::RegularFile),
        ]
    );
}
