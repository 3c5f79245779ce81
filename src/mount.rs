//! Mount management and lifecycle

use std::path::PathBuf;
use std::sync::Arc;

use fuser::MountOption;
use parking_lot::Mutex;
use tracing::info;

use crate::error::{BucketFsError, Result};
use crate::fuse::{FuseAdapter, FuseOptions};
use crate::tree::Tree;

/// Represents an active mount
pub struct ActiveMount {
    /// Mount path
    pub path: PathBuf,
    /// Session handle; dropping it unmounts
    session: Option<fuser::BackgroundSession>,
}

impl ActiveMount {
    fn new(path: PathBuf, session: fuser::BackgroundSession) -> Self {
        Self {
            path,
            session: Some(session),
        }
    }

    /// Unmount this filesystem
    pub fn unmount(&mut self) {
        if let Some(session) = self.session.take() {
            info!("Unmounting {:?}", self.path);
            drop(session);
        }
    }
}

impl Drop for ActiveMount {
    fn drop(&mut self) {
        self.unmount();
    }
}

/// Build the mount option list; the filesystem is always read-only
pub fn mount_options(allow_other: bool) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::FSName("bucketfs".to_string()),
        MountOption::Subtype("bucketfs".to_string()),
        MountOption::RO,
        MountOption::DefaultPermissions,
    ];
    if allow_other {
        // auto_unmount needs allow_other or allow_root
        options.push(MountOption::AllowOther);
        options.push(MountOption::AutoUnmount);
    }
    options
}

/// Mount manager - handles lifecycle of all mounts
#[derive(Default)]
pub struct MountManager {
    mounts: Mutex<Vec<ActiveMount>>,
}

impl MountManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount a tree at the specified path
    pub fn mount(
        &self,
        path: PathBuf,
        tree: Arc<Tree>,
        options: FuseOptions,
        allow_other: bool,
    ) -> Result<()> {
        info!("Mounting at {:?}", path);

        if !path.exists() {
            return Err(BucketFsError::NotFound(format!(
                "Mount point does not exist: {:?}",
                path
            )));
        }

        if !path.is_dir() {
            return Err(BucketFsError::NotADirectory(format!(
                "Mount point is not a directory: {:?}",
                path
            )));
        }

        let adapter = FuseAdapter::new(tree, options)?;

        let session = fuser::spawn_mount2(adapter, &path, &mount_options(allow_other))
            .map_err(BucketFsError::Io)?;

        self.mounts.lock().push(ActiveMount::new(path.clone(), session));

        info!("Successfully mounted at {:?}", path);
        Ok(())
    }

    /// Unmount all filesystems
    pub fn unmount_all(&self) {
        let mut mounts = self.mounts.lock();
        if !mounts.is_empty() {
            info!("Unmounting all filesystems");
        }
        for mut mount in mounts.drain(..) {
            mount.unmount();
        }
    }

    /// Number of active mounts
    pub fn count(&self) -> usize {
        self.mounts.lock().len()
    }
}

impl Drop for MountManager {
    fn drop(&mut self) {
        self.unmount_all();
    }
}
