//! `mount_webdav` bridge for macOS.

use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use super::{command, remove_mount_dir, MountTarget, PlatformMountBridge};

const VOLUMES: &str = "/Volumes";

/// Mounts with `mount_webdav -S -v <name>` into a fresh `/Volumes` directory.
///
/// `-S` suppresses the connection-lost dialog, `-v` sets the volume name
/// Finder shows.
#[derive(Debug, Clone)]
pub struct MacBridge {
    volumes: PathBuf,
    timeout: Duration,
}

impl MacBridge {
    pub fn new(timeout: Duration) -> Self {
        Self {
            volumes: PathBuf::from(VOLUMES),
            timeout,
        }
    }
}

impl PlatformMountBridge for MacBridge {
    fn attach(&self, url: &str, display_name: &str) -> Result<MountTarget> {
        let dir = tempfile::Builder::new()
            .prefix("oxsafe.")
            .tempdir_in(&self.volumes)
            .with_context(|| format!("Failed to create mount point in {}", self.volumes.display()))?
            .keep();

        let mut cmd = Command::new("mount_webdav");
        cmd.args(["-S", "-v", display_name]).arg(url).arg(&dir);
        if let Err(e) = command::run(cmd, self.timeout) {
            remove_mount_dir(&dir);
            return Err(e);
        }

        tracing::info!(url, mountpoint = %dir.display(), "Attached via mount_webdav");
        Ok(MountTarget::Directory(dir))
    }

    fn detach(&self, target: &MountTarget) -> Result<()> {
        let MountTarget::Directory(dir) = target else {
            bail!("mount_webdav cannot detach {target}");
        };
        let mut cmd = Command::new("umount");
        cmd.arg(dir);
        command::run(cmd, self.timeout)?;
        remove_mount_dir(dir);
        Ok(())
    }

    fn is_attached(&self, target: &MountTarget) -> bool {
        let MountTarget::Directory(dir) = target else {
            return false;
        };
        // A mount point sits on a different device than its parent
        let parent = dir.parent().unwrap_or(Path::new(VOLUMES));
        match (std::fs::metadata(dir), std::fs::metadata(parent)) {
            (Ok(mounted), Ok(parent)) => mounted.dev() != parent.dev(),
            _ => false,
        }
    }
}
