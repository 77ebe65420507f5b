//! Test server harness for WebDAV integration tests.
//!
//! Runs `run_server` on its own thread over a `CanonicalFs`-wrapped
//! `MemoryFs`, the same layering a real mount uses, and provides HTTP
//! convenience methods.

#![allow(dead_code)]

use bytes::Bytes;
use oxsafe_fs::{CanonicalFs, FsIo, MemoryFs};
use oxsafe_webdav::{mount_url, run_server, ServerHandle, WebDavResult};
use reqwest::{Client, Method, Response, StatusCode};
use std::net::TcpListener;
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::Duration;

/// Directory inside the memory filesystem that is served.
pub const ROOT: &str = "/vault";

/// Mount name used as the URL prefix.
pub const MOUNT_NAME: &str = "Vault";

/// Running server with HTTP client and automatic shutdown.
pub struct TestServer {
    handle: ServerHandle,
    thread: Option<JoinHandle<WebDavResult<()>>>,
    client: Client,
    /// Base URL including the mount prefix (ends with `/`).
    pub base_url: String,
    /// Backing store, for inspecting what landed on "disk".
    pub mem: Arc<MemoryFs>,
}

impl TestServer {
    /// Start a server over an empty directory.
    pub fn start() -> Self {
        let mem = Arc::new(MemoryFs::new());
        mem.create_dir_all(Path::new(ROOT)).expect("create root");
        let fs: Arc<dyn FsIo> = Arc::new(CanonicalFs::new(Arc::clone(&mem), ROOT));

        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let (ready_tx, ready_rx) = mpsc::channel();
        let thread = std::thread::spawn(move || {
            run_server(fs, ROOT, MOUNT_NAME, listener, move |handle| {
                ready_tx.send(handle).expect("report ready");
            })
        });
        let handle = ready_rx
            .recv_timeout(Duration::from_secs(10))
            .expect("server did not become ready");

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            // Fresh connection per request so disconnects never hit a pooled socket
            .pool_max_idle_per_host(0)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: mount_url(handle.local_addr(), MOUNT_NAME),
            handle,
            thread: Some(thread),
            client,
            mem,
        }
    }

    /// Control handle of the running server.
    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// Build a full URL from a path relative to the mount.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Stop the server and wait for its thread.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.handle.stop();
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .expect("server thread panicked")
                .expect("server returned error");
        }
    }

    // ========== HTTP Convenience Methods ==========

    /// GET a file.
    pub async fn get(&self, path: &str) -> Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("GET request failed")
    }

    /// GET a file's contents as bytes, or the failing status.
    pub async fn get_bytes(&self, path: &str) -> Result<Bytes, StatusCode> {
        let resp = self.get(path).await;
        let status = resp.status();
        if status.is_success() {
            Ok(resp.bytes().await.expect("Failed to read response bytes"))
        } else {
            Err(status)
        }
    }

    /// PUT file contents and assert success.
    pub async fn put_ok(&self, path: &str, body: impl Into<reqwest::Body>) {
        let resp = self
            .client
            .put(self.url(path))
            .body(body)
            .send()
            .await
            .expect("PUT request failed");
        assert!(
            resp.status().is_success(),
            "PUT {} failed with status {}",
            path,
            resp.status()
        );
    }

    /// DELETE a file or directory.
    pub async fn delete(&self, path: &str) -> StatusCode {
        self.client
            .delete(self.url(path))
            .send()
            .await
            .expect("DELETE request failed")
            .status()
    }

    /// MKCOL (create directory).
    pub async fn mkcol(&self, path: &str) -> StatusCode {
        self.request("MKCOL", path).send().await.expect("MKCOL request failed").status()
    }

    /// PROPFIND and return status and body.
    pub async fn propfind(&self, path: &str, depth: &str) -> (StatusCode, String) {
        let resp = self
            .request("PROPFIND", path)
            .header("Depth", depth)
            .send()
            .await
            .expect("PROPFIND request failed");
        let status = resp.status();
        (status, resp.text().await.unwrap_or_default())
    }

    /// MOVE a resource.
    pub async fn move_(&self, from: &str, to: &str) -> StatusCode {
        self.request("MOVE", from)
            .header("Destination", self.url(to))
            .header("Overwrite", "F")
            .send()
            .await
            .expect("MOVE request failed")
            .status()
    }

    fn request(&self, method: &str, path: &str) -> reqwest::RequestBuilder {
        let method = Method::from_bytes(method.as_bytes()).expect("valid method");
        self.client.request(method, self.url(path))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
