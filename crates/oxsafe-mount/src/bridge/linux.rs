//! davfs2 bridge for Linux.
//!
//! `mount -t davfs` usually needs root or a matching `user` entry in
//! `/etc/fstab`. Detach is lazy (`umount -l`) so a busy mount does not
//! keep the server alive.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use super::{command, mountinfo, remove_mount_dir, MountTarget, PlatformMountBridge};

/// Mounts through davfs2 into fresh directories under a base directory.
#[derive(Debug, Clone)]
pub struct DavfsBridge {
    mount_base: PathBuf,
    timeout: Duration,
}

impl DavfsBridge {
    /// Bridge creating mount points under the user's runtime directory
    /// (or the temp directory when there is none).
    pub fn new(timeout: Duration) -> Self {
        let base = crate::config::project_dirs()
            .ok()
            .and_then(|dirs| dirs.runtime_dir().map(Path::to_path_buf))
            .unwrap_or_else(|| std::env::temp_dir().join("oxsafe"));
        Self::with_mount_base(base, timeout)
    }

    pub fn with_mount_base(mount_base: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            mount_base: mount_base.into(),
            timeout,
        }
    }
}

impl PlatformMountBridge for DavfsBridge {
    fn attach(&self, url: &str, display_name: &str) -> Result<MountTarget> {
        std::fs::create_dir_all(&self.mount_base).with_context(|| {
            format!("Failed to create mount base {}", self.mount_base.display())
        })?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{display_name}."))
            .tempdir_in(&self.mount_base)
            .context("Failed to create mount point")?
            .keep();

        let mut cmd = Command::new("mount");
        cmd.args(["-t", "davfs"]).arg(url).arg(&dir);
        if let Err(e) = command::run(cmd, self.timeout) {
            remove_mount_dir(&dir);
            return Err(e);
        }

        tracing::info!(url, mountpoint = %dir.display(), "Attached via davfs");
        Ok(MountTarget::Directory(dir))
    }

    fn detach(&self, target: &MountTarget) -> Result<()> {
        let MountTarget::Directory(dir) = target else {
            bail!("davfs cannot detach {target}");
        };
        let mut cmd = Command::new("umount");
        cmd.arg("-l").arg(dir);
        command::run(cmd, self.timeout)?;
        remove_mount_dir(dir);
        Ok(())
    }

    fn is_attached(&self, target: &MountTarget) -> bool {
        let MountTarget::Directory(dir) = target else {
            return false;
        };
        std::fs::read_to_string("/proc/self/mountinfo")
            .is_ok_and(|contents| mountinfo::is_mount_point(&contents, dir))
    }
}
