pub mod inode;

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType as FuseFileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, Request,
};
use tracing::{debug, trace, warn};

use crate::config::DEFAULT_ATTR_TTL;
use crate::error::{BucketFsError, Result};
use crate::store::join_key;
use crate::tree::{Attributes, EntryKind, Tree};

use self::inode::{InodeTable, ROOT_INODE};

/// Generation number (not used, always 0)
const GENERATION: u64 = 0;

/// Block size for reporting
const BLOCK_SIZE: u32 = 4096;

/// Options for the kernel-facing side of a mount
#[derive(Debug, Clone)]
pub struct FuseOptions {
    /// TTL for attribute and entry caching in the kernel
    pub attr_ttl: Duration,
    /// User ID to report for all entries (defaults to process uid)
    pub uid: Option<u32>,
    /// Group ID to report for all entries (defaults to process gid)
    pub gid: Option<u32>,
}

impl Default for FuseOptions {
    fn default() -> Self {
        Self {
            attr_ttl: DEFAULT_ATTR_TTL,
            uid: None,
            gid: None,
        }
    }
}

/// Convert an entry kind to FUSE FileType
fn to_fuse_file_type(kind: EntryKind) -> FuseFileType {
    match kind {
        EntryKind::File => FuseFileType::RegularFile,
        EntryKind::Directory => FuseFileType::Directory,
    }
}

/// Convert synthesized attributes to FileAttr
fn to_file_attr(ino: u64, attr: &Attributes, mtime: SystemTime, uid: u32, gid: u32) -> FileAttr {
    FileAttr {
        ino,
        size: attr.size,
        blocks: attr.size.div_ceil(BLOCK_SIZE as u64),
        atime: mtime,
        mtime,
        ctime: mtime,
        crtime: mtime,
        kind: to_fuse_file_type(attr.kind),
        perm: attr.perm,
        nlink: attr.nlink(),
        uid,
        gid,
        rdev: 0,
        blksize: BLOCK_SIZE,
        flags: 0,
    }
}

/// Read-only FUSE filesystem that delegates to a [`Tree`]
pub struct FuseAdapter {
    tree: Arc<Tree>,
    inodes: InodeTable,
    /// Dedicated runtime for store calls made from FUSE callbacks.
    /// Taken in `Drop` so it can be shut down without blocking.
    runtime: Option<tokio::runtime::Runtime>,
    attr_ttl: Duration,
    uid: u32,
    gid: u32,
    /// Reported as every timestamp; objects carry no usable times here
    mounted_at: SystemTime,
}

impl FuseAdapter {
    /// Create a new FuseAdapter over the given tree
    pub fn new(tree: Arc<Tree>, options: FuseOptions) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .thread_name("bucketfs-fuse")
            .enable_all()
            .build()
            .map_err(BucketFsError::Io)?;

        let uid = options.uid.unwrap_or_else(|| unsafe { libc::getuid() });
        let gid = options.gid.unwrap_or_else(|| unsafe { libc::getgid() });

        Ok(Self {
            tree,
            inodes: InodeTable::new(),
            runtime: Some(runtime),
            attr_ttl: options.attr_ttl,
            uid,
            gid,
            mounted_at: SystemTime::now(),
        })
    }

    fn file_attr(&self, ino: u64, attr: &Attributes) -> FileAttr {
        to_file_attr(ino, attr, self.mounted_at, self.uid, self.gid)
    }

    /// Run an async operation on the dedicated runtime and wait for the result.
    fn run_async<F, T>(&self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        match &self.runtime {
            Some(runtime) => runtime.block_on(future),
            None => unreachable!("runtime is only taken on drop"),
        }
    }
}

impl Drop for FuseAdapter {
    fn drop(&mut self) {
        // The adapter may be dropped on an async thread (a failed
        // spawn_mount2 hands it back to the caller), where a blocking
        // runtime drop panics.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Filesystem for FuseAdapter {
    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_node) = self.inodes.get_node(parent) else {
            reply.error(libc::ENOENT);
            return;
        };

        // Keys are UTF-8, so a non-UTF-8 name cannot exist in the store
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };

        trace!("lookup: parent={:?} name={}", parent_node.key(), name);

        match self.run_async(self.tree.resolve(&parent_node, name)) {
            Ok(node) => {
                let attr = node.attributes();
                let ino = self.inodes.remember(node);
                reply.entry(&self.attr_ttl, &self.file_attr(ino, &attr), GENERATION);
            }
            Err(e) => {
                if e.is_not_found() {
                    debug!("lookup {:?}/{}: {}", parent_node.key(), name, e);
                } else {
                    warn!("lookup {:?}/{} failed: {}", parent_node.key(), name, e);
                }
                reply.error(e.lookup_errno());
            }
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        self.inodes.forget(ino, nlookup);
        trace!(
            "forget: ino={} nlookup={} live_nodes={} numbered_keys={}",
            ino,
            nlookup,
            self.inodes.live_nodes(),
            self.inodes.numbered_keys()
        );
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        match self.inodes.get_node(ino) {
            Some(node) => {
                trace!("getattr: {:?} (ino={})", node.key(), ino);
                reply.attr(&self.attr_ttl, &self.file_attr(ino, &node.attributes()));
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        if flags & libc::O_ACCMODE != libc::O_RDONLY {
            reply.error(BucketFsError::ReadOnly.to_errno());
            return;
        }
        match self.inodes.get_node(ino) {
            Some(node) if node.is_dir() => reply.error(libc::EISDIR),
            Some(_) => reply.opened(0, 0),
            None => reply.error(libc::ENOENT),
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
        let Some(node) = self.inodes.get_node(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };

        trace!("read: {:?} offset={} size={}", node.key(), offset, size);

        match self.run_async(self.tree.read(&node, offset, size)) {
            Ok(data) => reply.data(&data),
            Err(e) => {
                warn!("read error for {:?}: {}", node.key(), e);
                reply.error(e.to_errno());
            }
        }
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
        reply.ok();
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        match self.inodes.get_node(ino) {
            Some(node) if node.is_dir() => reply.opened(0, 0),
            Some(_) => reply.error(libc::ENOTDIR),
            None => reply.error(libc::ENOENT),
        }
    }

    fn releasedir(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        _fh: u64,
        _flags: i32,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(node) = self.inodes.get_node(ino) else {
            reply.error(libc::ENOENT);
            return;
        };

        trace!("readdir: {:?} offset={}", node.key(), offset);

        let entries = match self.run_async(self.tree.list_children(&node)) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("readdir error for {:?}: {}", node.key(), e);
                reply.error(e.to_errno());
                return;
            }
        };

        let parent_ino = node
            .parent_key()
            .and_then(|key| self.inodes.get_inode(key))
            .unwrap_or(ROOT_INODE);

        let dots = [
            (ino, FuseFileType::Directory, ".".to_string()),
            (parent_ino, FuseFileType::Directory, "..".to_string()),
        ];
        let children = entries.into_iter().map(|entry| {
            let child_ino = self.inodes.listing_inode(&join_key(node.key(), &entry.name));
            (child_ino, to_fuse_file_type(entry.kind), entry.name)
        });

        for (idx, (entry_ino, kind, name)) in dots.into_iter().chain(children).enumerate() {
            let next = idx as i64 + 1;
            if next <= offset {
                continue;
            }
            if reply.add(entry_ino, next, kind, &name) {
                // Buffer full
                break;
            }
        }

        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        if self.inodes.get_node(ino).is_none() {
            reply.error(libc::ENOENT);
        } else if mask & libc::W_OK != 0 {
            reply.error(BucketFsError::ReadOnly.to_errno());
        } else {
            reply.ok();
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        // Object stores have no meaningful capacity; nothing is writable
        reply.statfs(
            0,          // blocks
            0,          // bfree
            0,          // bavail
            0,          // files
            0,          // ffree
            BLOCK_SIZE, // bsize
            1024,       // namelen (S3 key limit)
            BLOCK_SIZE, // frsize
        );
    }
}
