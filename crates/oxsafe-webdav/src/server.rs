//! HTTP server lifecycle for one mount.
//!
//! [`run_server`] owns the calling thread: it builds a current-thread tokio
//! runtime, adopts an already-bound listener, reports readiness exactly once
//! through its callback and then serves until told to stop through the
//! returned [`ServerHandle`].

use crate::error::{WebDavError, WebDavResult};
use crate::filesystem::SafeDavFs;
use dav_server::{fakels::FakeLs, DavHandler};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper::Request;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use oxsafe_fs::FsIo;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Characters escaped when a mount name is placed in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// URL under which a mount named `mount_name` is served at `addr`.
///
/// Always uses the numeric loopback address: resolving `localhost` may
/// prefer IPv6, where nothing is listening.
pub fn mount_url(addr: SocketAddr, mount_name: &str) -> String {
    format!(
        "http://{}:{}/{}/",
        addr.ip(),
        addr.port(),
        utf8_percent_encode(mount_name, PATH_SEGMENT)
    )
}

/// Commands accepted by a running server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    /// Drop every open client connection but keep accepting new ones.
    DisconnectClients,
    /// Close the listener and all connections, then return.
    Stop,
}

/// Control handle for a running server. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    addr: SocketAddr,
    control: mpsc::UnboundedSender<Control>,
}

impl ServerHandle {
    /// Address the server is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Port the server is listening on.
    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Ask the server to stop. Returns immediately; the server's thread
    /// returns from [`run_server`] once connections are torn down.
    pub fn stop(&self) {
        if self.control.send(Control::Stop).is_err() {
            debug!(addr = %self.addr, "Stop requested but server already exited");
        }
    }

    /// Ask the server to drop all connected clients without stopping.
    pub fn disconnect_clients(&self) {
        if self.control.send(Control::DisconnectClients).is_err() {
            debug!(addr = %self.addr, "Disconnect requested but server already exited");
        }
    }

    /// Whether the serve loop is still running.
    pub fn is_running(&self) -> bool {
        !self.control.is_closed()
    }
}

/// Serve `root` of `fs` over WebDAV on `listener` until stopped.
///
/// Resources are reachable below `/<mount_name>/`. `on_ready` is invoked
/// exactly once, after the handler is built and before the first accept;
/// if setup fails it is never invoked and the error is returned instead.
///
/// Blocks the calling thread for the lifetime of the server.
pub fn run_server<F>(
    fs: Arc<dyn FsIo>,
    root: impl Into<PathBuf>,
    mount_name: &str,
    listener: std::net::TcpListener,
    on_ready: F,
) -> WebDavResult<()>
where
    F: FnOnce(ServerHandle),
{
    listener.set_nonblocking(true)?;
    let addr = listener.local_addr()?;
    let root = root.into();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .thread_name("oxsafe-webdav")
        .build()?;

    runtime.block_on(async move {
        let listener = TcpListener::from_std(listener)?;

        // FakeLs gives clients the minimal lock support macOS/Windows insist on
        let handler = DavHandler::builder()
            .filesystem(Box::new(SafeDavFs::new(fs, root)))
            .locksystem(FakeLs::new())
            .strip_prefix(format!("/{mount_name}"))
            .build_handler();

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        info!(addr = %addr, mount = %mount_name, "WebDAV server accepting connections");
        on_ready(ServerHandle {
            addr,
            control: control_tx,
        });

        serve(listener, Arc::new(handler), control_rx).await;
        info!(addr = %addr, "WebDAV server stopped");
        Ok::<(), WebDavError>(())
    })
}

/// Accept loop. Returns on [`Control::Stop`] or when every handle is gone.
async fn serve(
    listener: TcpListener,
    handler: Arc<DavHandler>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    connections.spawn(serve_connection(stream, peer_addr, Arc::clone(&handler)));
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            },
            command = control.recv() => match command {
                Some(Control::DisconnectClients) => {
                    info!(count = connections.len(), "Disconnecting all clients");
                    connections.abort_all();
                }
                Some(Control::Stop) => {
                    info!("Received shutdown signal");
                    break;
                }
                None => {
                    debug!("All server handles dropped, shutting down");
                    break;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }
    drop(listener);
    connections.shutdown().await;
}

async fn serve_connection(stream: TcpStream, peer_addr: SocketAddr, handler: Arc<DavHandler>) {
    let io = TokioIo::new(stream);
    let service = service_fn(move |req: Request<Incoming>| {
        let handler = Arc::clone(&handler);
        async move {
            let resp = handler.handle(req).await;
            Ok::<_, Infallible>(resp)
        }
    });

    if let Err(e) = auto::Builder::new(TokioExecutor::new())
        .serve_connection(io, service)
        .await
    {
        // With auto protocol negotiation, client hang-ups are indistinguishable
        // from real failures
        warn!(peer = %peer_addr, error = %e, "HTTP connection error");
    }
}
