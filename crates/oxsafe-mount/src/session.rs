//! Mount lifecycle: worker thread, handshake, OS attach, teardown.
//!
//! ```text
//! mount()                                      unmount() / drop
//!   │ spawn worker ──► open container             │ bridge.detach
//!   │                  bind loopback port          │ server.stop
//!   │                  run_server ── ready ──┐     │ join worker
//!   │ wait handshake ◄───────────────────────┘     ▼
//!   │ bridge.attach                              Stopped
//!   ▼
//! MountSession (Running)
//! ```
//!
//! Each mount owns one OS thread running a single-threaded runtime. The
//! controller blocks only on the handshake, which the worker signals exactly
//! once: ready, failed, or (if it dies first) abandoned.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use oxsafe_fs::{CanonicalFs, FsIo};
use oxsafe_webdav::{mount_url, run_server, ServerHandle};
use parking_lot::Mutex;
use secrecy::SecretString;
use tracing::{debug, error, info, info_span, warn};

use crate::binder::bind_listener;
use crate::bridge::{default_bridge, MountTarget, PlatformMountBridge};
use crate::config::MountConfig;
use crate::encryption::EncryptedFsFactory;
use crate::error::{MountError, OpenError};
use crate::handshake::{handshake, HandshakeError, HandshakeSender};
use crate::recent::RecentlyUsedPathStore;

/// Name used when the container path has no final component.
const FALLBACK_MOUNT_NAME: &str = "oxsafe";

/// Lifecycle of a mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountState {
    /// Worker spawned, handshake pending.
    Starting,
    /// Server up and attached.
    Running,
    /// Teardown in progress.
    Stopping,
    /// Worker exited. Terminal.
    Stopped,
}

impl MountState {
    fn can_become(self, next: MountState) -> bool {
        use MountState::{Running, Starting, Stopped, Stopping};
        matches!(
            (self, next),
            (Starting, Running) | (Starting, Stopped) | (Running, Stopping) | (Stopping, Stopped)
        )
    }

    fn advance(&mut self, next: MountState) {
        assert!(
            self.can_become(next),
            "invalid mount state transition {self:?} -> {next:?}"
        );
        debug!(from = ?*self, to = ?next, "Mount state change");
        *self = next;
    }
}

/// Why the worker could not report readiness.
#[derive(Debug)]
enum WorkerFailure {
    Authentication,
    Other(String),
}

/// Mounts containers. Shareable across threads; each [`mount`](Self::mount)
/// call is independent.
pub struct Orchestrator<F: EncryptedFsFactory> {
    factory: Arc<F>,
    bridge: Arc<dyn PlatformMountBridge>,
    config: MountConfig,
    recent: Option<Mutex<RecentlyUsedPathStore>>,
}

impl<F: EncryptedFsFactory> fmt::Debug for Orchestrator<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("tracks_recent", &self.recent.is_some())
            .finish_non_exhaustive()
    }
}

impl<F: EncryptedFsFactory> Orchestrator<F> {
    pub fn new(factory: F, bridge: Arc<dyn PlatformMountBridge>, config: MountConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            bridge,
            config,
            recent: None,
        }
    }

    /// Orchestrator using this platform's mount bridge.
    pub fn with_default_bridge(factory: F, config: MountConfig) -> Self {
        let bridge = Arc::from(default_bridge(config.attach_timeout));
        Self::new(factory, bridge, config)
    }

    /// Record every successfully mounted container in `store`.
    #[must_use]
    pub fn with_recent_paths(mut self, store: RecentlyUsedPathStore) -> Self {
        self.recent = Some(Mutex::new(store));
        self
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    /// Recently mounted containers, most recent first, if tracked.
    pub fn recent_paths(&self) -> Option<Vec<PathBuf>> {
        self.recent
            .as_ref()
            .map(|store| store.lock().recently_used_paths().to_vec())
    }

    /// Mount the container at `container_path` and attach it to the OS.
    ///
    /// Blocks until the server is accepting connections (or failed to) and
    /// the bridge has attached it. On any failure the worker thread has
    /// already been joined when this returns.
    pub fn mount(
        &self,
        native_fs: Arc<dyn FsIo>,
        container_path: &Path,
        encryption_config: F::Config,
        password: SecretString,
    ) -> Result<MountSession, MountError> {
        match native_fs.get_attrs(container_path) {
            Ok(attrs) if attrs.is_dir() => {}
            Ok(_) => return Err(MountError::NotADirectory(container_path.to_path_buf())),
            Err(e) if e.is_not_found() => {
                return Err(MountError::NotADirectory(container_path.to_path_buf()));
            }
            Err(e) => return Err(e.into()),
        }

        let mount_name = container_path
            .file_name()
            .map_or_else(|| FALLBACK_MOUNT_NAME.to_string(), |n| n.to_string_lossy().into_owned());
        let mut state = MountState::Starting;
        info!(container = %container_path.display(), name = %mount_name, "Mounting container");

        let (ready_tx, ready_rx) = handshake::<ServerHandle, WorkerFailure>();
        let worker = {
            let factory = Arc::clone(&self.factory);
            let config = self.config.clone();
            let root = container_path.to_path_buf();
            let name = mount_name.clone();
            std::thread::Builder::new()
                .name(format!("oxsafe-mount-{mount_name}"))
                .spawn(move || {
                    run_worker(
                        factory.as_ref(),
                        native_fs,
                        &root,
                        &name,
                        encryption_config,
                        &password,
                        &config,
                        ready_tx,
                    );
                })
                .map_err(|e| MountError::ServerStartFailed(format!("failed to spawn worker: {e}")))?
        };

        let server = match ready_rx.wait() {
            Ok(server) => server,
            Err(failure) => {
                join_worker(worker);
                state.advance(MountState::Stopped);
                return Err(match failure {
                    HandshakeError::Failed(WorkerFailure::Authentication) => {
                        MountError::AuthenticationFailed(container_path.to_path_buf())
                    }
                    HandshakeError::Failed(WorkerFailure::Other(reason)) => {
                        MountError::ServerStartFailed(reason)
                    }
                    HandshakeError::Abandoned => MountError::ServerStartFailed(
                        "worker exited without reporting".to_string(),
                    ),
                });
            }
        };

        let url = mount_url(server.local_addr(), &mount_name);
        let target = match self.bridge.attach(&url, &mount_name) {
            Ok(target) => target,
            Err(e) => {
                warn!(url = %url, error = %e, "Attach failed, stopping server");
                server.stop();
                join_worker(worker);
                state.advance(MountState::Stopped);
                return Err(MountError::PlatformMountFailed(e));
            }
        };

        state.advance(MountState::Running);
        info!(url = %url, mount_target = %target, "Container mounted");

        if let Some(recent) = &self.recent
            && let Err(e) = recent.lock().use_path(container_path)
        {
            warn!(error = %e, "Could not record recently used container");
        }

        Ok(MountSession {
            container_path: container_path.to_path_buf(),
            mount_name,
            url,
            target,
            server,
            worker: Some(worker),
            bridge: Arc::clone(&self.bridge),
            state,
        })
    }
}

/// Body of the per-mount thread. Signals `ready` exactly once (or drops it).
#[allow(clippy::too_many_arguments)]
fn run_worker<F: EncryptedFsFactory>(
    factory: &F,
    native_fs: Arc<dyn FsIo>,
    root: &Path,
    mount_name: &str,
    encryption_config: F::Config,
    password: &SecretString,
    config: &MountConfig,
    ready: HandshakeSender<ServerHandle, WorkerFailure>,
) {
    let _span = info_span!("mount_worker", name = %mount_name).entered();

    let plain = match factory.open(native_fs, root, encryption_config, password) {
        Ok(fs) => fs,
        Err(OpenError::AuthenticationFailed) => {
            info!("Container rejected the password");
            ready.fail(WorkerFailure::Authentication);
            return;
        }
        Err(e) => {
            error!(error = %e, "Failed to open container");
            ready.fail(WorkerFailure::Other(e.to_string()));
            return;
        }
    };
    let fs: Arc<dyn FsIo> = Arc::new(CanonicalFs::new(plain, root));

    let listener = match bind_listener(
        config.bind_address,
        config.fixed_port,
        &config.port_range(),
    ) {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "Failed to bind server port");
            ready.fail(WorkerFailure::Other(format!("failed to bind port: {e}")));
            return;
        }
    };

    let mut ready = Some(ready);
    let result = run_server(fs, root, mount_name, listener, |handle| {
        if let Some(ready) = ready.take() {
            ready.succeed(handle);
        }
    });

    match (result, ready) {
        (Ok(()), _) => debug!("Server exited"),
        (Err(e), Some(ready)) => {
            error!(error = %e, "Server failed to start");
            ready.fail(WorkerFailure::Other(e.to_string()));
        }
        (Err(e), None) => error!(error = %e, "Server stopped with error"),
    }
}

fn join_worker(worker: JoinHandle<()>) {
    if worker.join().is_err() {
        error!("Mount worker panicked");
    }
}

/// One mounted container.
///
/// Exclusively owns its worker thread and server handle. Call
/// [`unmount`](Self::unmount) to tear it down and observe errors; dropping
/// the session tears down too, logging errors instead.
pub struct MountSession {
    container_path: PathBuf,
    mount_name: String,
    url: String,
    target: MountTarget,
    server: ServerHandle,
    worker: Option<JoinHandle<()>>,
    bridge: Arc<dyn PlatformMountBridge>,
    state: MountState,
}

impl fmt::Debug for MountSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountSession")
            .field("container_path", &self.container_path)
            .field("url", &self.url)
            .field("target", &self.target)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl MountSession {
    /// Detach from the OS, stop the server and join the worker.
    ///
    /// Always stops and joins, even if detaching fails; the detach error is
    /// returned afterwards.
    pub fn unmount(mut self) -> Result<(), MountError> {
        self.teardown()
    }

    fn teardown(&mut self) -> Result<(), MountError> {
        assert!(
            self.state != MountState::Stopped,
            "unmount of a stopped mount session"
        );
        self.state.advance(MountState::Stopping);
        info!(mount_target = %self.target, "Unmounting container");

        let detached = self.bridge.detach(&self.target);
        if let Err(e) = &detached {
            warn!(mount_target = %self.target, error = %e, "Detach failed, stopping server anyway");
        }

        self.server.stop();
        if let Some(worker) = self.worker.take() {
            join_worker(worker);
        }
        self.state.advance(MountState::Stopped);

        detached.map_err(MountError::PlatformMountFailed)
    }

    /// True until the worker thread has exited. Never blocks.
    pub fn is_still_mounted(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Whether the OS still reports the drive attached.
    pub fn is_attached(&self) -> bool {
        self.bridge.is_attached(&self.target)
    }

    /// Drop every connected client without stopping the server.
    pub fn disconnect_clients(&self) {
        self.server.disconnect_clients();
    }

    pub fn state(&self) -> MountState {
        self.state
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn port(&self) -> u16 {
        self.server.port()
    }

    /// Container basename, as used in the URL and by the OS.
    pub fn mount_name(&self) -> &str {
        &self.mount_name
    }

    /// Mount name with double quotes backslash-escaped, for shell contexts.
    pub fn display_name(&self) -> String {
        self.mount_name.replace('"', "\\\"")
    }

    pub fn mount_target(&self) -> &MountTarget {
        &self.target
    }

    pub fn container_path(&self) -> &Path {
        &self.container_path
    }
}

impl Drop for MountSession {
    fn drop(&mut self) {
        if self.state != MountState::Stopped
            && let Err(e) = self.teardown()
        {
            error!(container = %self.container_path.display(), error = %e, "Teardown on drop failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_transitions() {
        use MountState::{Running, Starting, Stopped, Stopping};
        assert!(Starting.can_become(Running));
        assert!(Starting.can_become(Stopped));
        assert!(Running.can_become(Stopping));
        assert!(Stopping.can_become(Stopped));

        assert!(!Stopped.can_become(Running));
        assert!(!Stopped.can_become(Starting));
        assert!(!Running.can_become(Stopped));
        assert!(!Starting.can_become(Stopping));
    }

    #[test]
    #[should_panic(expected = "invalid mount state transition")]
    fn test_no_way_out_of_stopped() {
        let mut state = MountState::Stopped;
        state.advance(MountState::Running);
    }
}
