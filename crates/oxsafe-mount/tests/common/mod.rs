//! Shared fakes for mount lifecycle tests.
//!
//! - [`FakeCipher`]: "opens" a container by handing back the base
//!   filesystem, with behaviour chosen per mount
//! - [`RecordingBridge`]: attaches nothing, records every call
//! - [`http_status`]: minimal HTTP/1.1 client over a raw socket

#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use oxsafe_fs::{FsIo, MemoryFs};
use oxsafe_mount::{EncryptedFsFactory, MountTarget, OpenError, PlatformMountBridge};
use parking_lot::Mutex;
use secrecy::{ExposeSecret, SecretString};

pub const PASSWORD: &str = "correct horse";
pub const CONTAINERS: &str = "/containers";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Memory filesystem with `/containers/<name>` created for each name.
pub fn native_fs(containers: &[&str]) -> Arc<MemoryFs> {
    let fs = Arc::new(MemoryFs::new());
    fs.create_dir_all(Path::new(CONTAINERS)).unwrap();
    for name in containers {
        fs.create_dir_all(&Path::new(CONTAINERS).join(name)).unwrap();
    }
    fs
}

pub fn password(s: &str) -> SecretString {
    SecretString::from(s.to_string())
}

/// What the fake cipher does when asked to open a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Open,
    RejectConfig,
    Panic,
}

#[derive(Debug, Default)]
pub struct FakeCipher;

impl EncryptedFsFactory for FakeCipher {
    type Config = Behaviour;

    fn open(
        &self,
        base: Arc<dyn FsIo>,
        _container_root: &Path,
        config: Behaviour,
        password: &SecretString,
    ) -> Result<Arc<dyn FsIo>, OpenError> {
        match config {
            Behaviour::Panic => panic!("cipher exploded"),
            Behaviour::RejectConfig => {
                Err(OpenError::InvalidConfiguration("unknown cipher".into()))
            }
            Behaviour::Open if password.expose_secret() != PASSWORD => {
                Err(OpenError::AuthenticationFailed)
            }
            Behaviour::Open => Ok(base),
        }
    }
}

/// Bridge that pretends to attach, recording calls.
#[derive(Debug, Default)]
pub struct RecordingBridge {
    pub fail_attach: bool,
    pub fail_detach: bool,
    events: Mutex<Vec<String>>,
}

impl RecordingBridge {
    pub fn failing_attach() -> Self {
        Self {
            fail_attach: true,
            ..Self::default()
        }
    }

    pub fn failing_detach() -> Self {
        Self {
            fail_detach: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    /// URL passed to the most recent attach call.
    pub fn last_attached_url(&self) -> Option<String> {
        self.events
            .lock()
            .iter()
            .rev()
            .find_map(|e| e.strip_prefix("attach ").map(|rest| rest.split(' ').next().unwrap().to_string()))
    }
}

impl PlatformMountBridge for RecordingBridge {
    fn attach(&self, url: &str, display_name: &str) -> anyhow::Result<MountTarget> {
        self.events.lock().push(format!("attach {url} {display_name}"));
        if self.fail_attach {
            bail!("attach refused");
        }
        Ok(MountTarget::Url(url.to_string()))
    }

    fn detach(&self, target: &MountTarget) -> anyhow::Result<()> {
        self.events.lock().push(format!("detach {target}"));
        if self.fail_detach {
            bail!("detach refused");
        }
        Ok(())
    }

    fn is_attached(&self, _target: &MountTarget) -> bool {
        true
    }
}

/// Port in an `http://127.0.0.1:<port>/...` URL.
pub fn port_of(url: &str) -> u16 {
    url.trim_start_matches("http://127.0.0.1:")
        .split('/')
        .next()
        .unwrap()
        .parse()
        .unwrap()
}

pub fn is_listening(port: u16) -> bool {
    TcpStream::connect(("127.0.0.1", port)).is_ok()
}

/// Send one request (with `Depth: 0`) and return the response status code.
pub fn http_status(port: u16, method: &str, path: &str, body: &[u8]) -> u16 {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(10))).unwrap();
    write!(
        stream,
        "{method} {path} HTTP/1.1\r\nHost: 127.0.0.1:{port}\r\nContent-Length: {}\r\nDepth: 0\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .unwrap();
    stream.write_all(body).unwrap();

    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    let head = String::from_utf8_lossy(&response);
    head.split(' ').nth(1).unwrap().parse().unwrap()
}
