//! `net use` bridge for Windows.

use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use super::{command, MountTarget, PlatformMountBridge};

/// Maps the URL to the first free drive letter with `net use`.
#[derive(Debug, Clone)]
pub struct NetUseBridge {
    timeout: Duration,
}

impl NetUseBridge {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

fn drive_root(letter: char) -> PathBuf {
    PathBuf::from(format!("{letter}:\\"))
}

/// First letter from D onwards with nothing mounted on it.
fn free_drive_letter() -> Option<char> {
    ('D'..='Z').find(|letter| !drive_root(*letter).exists())
}

impl PlatformMountBridge for NetUseBridge {
    fn attach(&self, url: &str, display_name: &str) -> Result<MountTarget> {
        let letter = free_drive_letter().context("No free drive letter")?;

        let mut cmd = Command::new("net");
        cmd.arg("use").arg(format!("{letter}:")).arg(url);
        command::run(cmd, self.timeout)
            .with_context(|| format!("Failed to map {display_name} to {letter}:"))?;

        tracing::info!(url, drive = %letter, "Attached via net use");
        Ok(MountTarget::DriveLetter(letter))
    }

    fn detach(&self, target: &MountTarget) -> Result<()> {
        let MountTarget::DriveLetter(letter) = target else {
            bail!("net use cannot detach {target}");
        };
        let mut cmd = Command::new("net");
        cmd.arg("use").arg(format!("{letter}:")).args(["/delete", "/y"]);
        command::run(cmd, self.timeout)
    }

    fn is_attached(&self, target: &MountTarget) -> bool {
        match target {
            MountTarget::DriveLetter(letter) => drive_root(*letter).exists(),
            _ => false,
        }
    }
}
