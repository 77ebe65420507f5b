//! Attaching a running server to the OS as a drive.
//!
//! Each platform ships a WebDAV client that can mount a URL: `mount_webdav`
//! on macOS, the WebClient redirector behind `net use` on Windows, and
//! davfs2 on Linux. The bridges here only invoke those tools and report
//! their result; the server side knows nothing about them.
//!
//! Mount names are passed as separate arguments, never through a shell, so
//! they need no quoting.

#[cfg_attr(not(any(target_os = "macos", target_os = "linux", windows)), allow(dead_code))]
mod command;
#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "macos")]
mod macos;
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
mod mountinfo;
#[cfg(windows)]
mod windows;

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

#[cfg(target_os = "linux")]
pub use linux::DavfsBridge;
#[cfg(target_os = "macos")]
pub use macos::MacBridge;
#[cfg(windows)]
pub use windows::NetUseBridge;

/// Where the OS made a mount visible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountTarget {
    /// A mount point directory (macOS, Linux).
    Directory(PathBuf),
    /// A drive letter (Windows).
    DriveLetter(char),
    /// Nothing was attached; the user mounts this URL themselves.
    Url(String),
}

impl fmt::Display for MountTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MountTarget::Directory(path) => write!(f, "{}", path.display()),
            MountTarget::DriveLetter(letter) => write!(f, "{letter}:"),
            MountTarget::Url(url) => f.write_str(url),
        }
    }
}

/// OS facility that attaches a WebDAV URL as a drive.
pub trait PlatformMountBridge: Send + Sync {
    /// Mount `url` under the user-visible `display_name`.
    fn attach(&self, url: &str, display_name: &str) -> Result<MountTarget>;

    /// Release a target returned by [`attach`](Self::attach).
    fn detach(&self, target: &MountTarget) -> Result<()>;

    /// Whether the OS still has `target` attached.
    fn is_attached(&self, target: &MountTarget) -> bool;
}

/// Bridge that attaches nothing and hands back the URL.
///
/// Useful on platforms without a supported WebDAV client, and for headless
/// use where another program does the mounting.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualBridge;

impl PlatformMountBridge for ManualBridge {
    fn attach(&self, url: &str, display_name: &str) -> Result<MountTarget> {
        tracing::info!(url, name = display_name, "Server ready; mount the URL manually");
        Ok(MountTarget::Url(url.to_string()))
    }

    fn detach(&self, _target: &MountTarget) -> Result<()> {
        Ok(())
    }

    fn is_attached(&self, target: &MountTarget) -> bool {
        matches!(target, MountTarget::Url(_))
    }
}

/// The bridge for the current platform, or [`ManualBridge`] where none exists.
pub fn default_bridge(command_timeout: Duration) -> Box<dyn PlatformMountBridge> {
    #[cfg(target_os = "macos")]
    {
        Box::new(MacBridge::new(command_timeout))
    }

    #[cfg(target_os = "linux")]
    {
        Box::new(DavfsBridge::new(command_timeout))
    }

    #[cfg(windows)]
    {
        Box::new(NetUseBridge::new(command_timeout))
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", windows)))]
    {
        let _ = command_timeout;
        Box::new(ManualBridge)
    }
}

/// Remove a mount point directory we created, logging instead of failing.
#[cfg(any(target_os = "macos", target_os = "linux"))]
fn remove_mount_dir(dir: &std::path::Path) {
    if let Err(e) = std::fs::remove_dir(dir) {
        tracing::debug!("Could not remove mount directory {}: {}", dir.display(), e);
    }
}
