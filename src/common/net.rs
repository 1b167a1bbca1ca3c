//! Network utility functions
//!
//! This module provides small helpers shared by the listener and the dialers.

use std::io;
use std::time::Duration;

use rand::Rng;
use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

/// Idle time before TCP keepalive probes start
pub const TCP_KEEPALIVE_TIME: Duration = Duration::from_secs(30);

/// Default length of a session identifier
pub const SESSION_ID_LEN: usize = 8;

const ID_CHARSET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generate a short random token used to correlate log lines
///
/// Collisions are tolerated: the identifier is never used as a key.
pub fn random_session_id(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())] as char)
        .collect()
}

/// Enable `TCP_NODELAY` and keepalive probes on a connected socket
pub fn configure_tcp_stream(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let keepalive = TcpKeepalive::new().with_time(TCP_KEEPALIVE_TIME);
    SockRef::from(stream).set_tcp_keepalive(&keepalive)
}
