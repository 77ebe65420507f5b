//! Running OS mount tools with a deadline.
//!
//! Mount helpers can hang indefinitely (an unreachable server, a prompt
//! nobody answers). The child is polled until the timeout expires and then
//! killed and reaped, so a late attach cannot happen behind our back.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{debug, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run `command` to completion, failing on timeout or non-zero exit.
pub(crate) fn run(mut command: Command, timeout: Duration) -> Result<()> {
    let described = describe(&command);
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("Failed to run {described}"))?;

    // Drain stderr off-thread so a chatty tool cannot block on a full pipe
    let stderr_handle = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            let _ = stderr.read_to_end(&mut buffer);
            buffer
        })
    });

    let status = wait_with_deadline(&mut child, timeout)
        .with_context(|| format!("Failed to wait for {described}"))?;

    // On timeout the reader is left behind: a forked helper may still hold the pipe
    let Some(status) = status else {
        bail!("{described} did not finish within {timeout:?}");
    };

    let stderr = stderr_handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    if status.success() {
        debug!(command = %described, "Command succeeded");
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&stderr);
    bail!("{described} failed ({status}): {}", stderr.trim())
}

/// Poll until the child exits or `timeout` passes.
///
/// On expiry the child is killed and reaped, and `None` is returned.
fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
) -> std::io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            warn!(pid = child.id(), ?timeout, "Killing command that did not finish");
            if let Err(e) = child.kill() {
                // Already exited between the poll and the kill
                debug!(error = %e, "Kill failed");
            }
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Program and arguments, for messages.
fn describe(command: &Command) -> String {
    std::iter::once(command.get_program())
        .chain(command.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}
