//! Loopback port selection.
//!
//! Candidates are drawn uniformly at random from the requested range so
//! concurrent mounts, and other local processes using the dynamic range,
//! rarely collide. A candidate that is already taken is simply redrawn.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, TcpListener};
use std::ops::RangeInclusive;

use rand::Rng;
use tracing::{debug, trace};

/// IANA dynamic/private port range.
pub const DEFAULT_PORT_RANGE: RangeInclusive<u16> = 49152..=65535;

/// Loopback address every server binds to.
pub const LOOPBACK: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Bind a listener on `ip` at a random free port in `[low, high]`.
///
/// Retries while the candidate is in use; any other bind error is returned.
/// The search is unbounded, so a fully occupied range never returns.
pub fn bind_free_port(ip: IpAddr, low: u16, high: u16) -> io::Result<TcpListener> {
    if low > high {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("empty port range {low}..={high}"),
        ));
    }
    if low == 0 {
        return Err(port_zero());
    }

    let mut rng = rand::rng();
    let mut attempts = 0u32;
    loop {
        let port = rng.random_range(low..=high);
        attempts += 1;
        match TcpListener::bind(SocketAddr::new(ip, port)) {
            Ok(listener) => {
                debug!(port, attempts, "Bound loopback listener");
                return Ok(listener);
            }
            Err(e) if is_taken(&e) => {
                trace!(port, error = %e, "Port unavailable, drawing another");
            }
            Err(e) => return Err(e),
        }
    }
}

/// Bind on `ip`, either at `fixed` exactly or at a random free port in `range`.
pub fn bind_listener(
    ip: IpAddr,
    fixed: Option<u16>,
    range: &RangeInclusive<u16>,
) -> io::Result<TcpListener> {
    match fixed {
        Some(0) => Err(port_zero()),
        Some(port) => TcpListener::bind(SocketAddr::new(ip, port)),
        None => bind_free_port(ip, *range.start(), *range.end()),
    }
}

/// Whether a bind failure means "try another port".
///
/// Windows reports ports in excluded ranges (Hyper-V, WinNAT) as
/// `PermissionDenied` rather than `AddrInUse`.
fn is_taken(e: &io::Error) -> bool {
    match e.kind() {
        io::ErrorKind::AddrInUse => true,
        io::ErrorKind::PermissionDenied => cfg!(windows),
        _ => false,
    }
}

fn port_zero() -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        "port 0 would let the OS pick a port outside the range",
    )
}

/// Pick a free loopback port in `[low, high]`.
///
/// The probe listener is closed before returning, so another process may
/// take the port in between. Prefer [`bind_free_port`] and hand the
/// listener itself to the server.
pub fn find_free_port(low: u16, high: u16) -> io::Result<u16> {
    let listener = bind_free_port(LOOPBACK, low, high)?;
    Ok(listener.local_addr()?.port())
}
