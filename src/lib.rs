//! Port Mirror: TCP port mirroring through proxy chains
//!
//! Listens on local endpoints and relays every accepted connection to a
//! remote target, directly or through an ordered chain of forward proxies
//! (HTTP/HTTPS CONNECT, SOCKS4/4a/5/5h).
//!
//! # Main Features
//!
//! - Endpoint parsing for `host:port`, `tcp://host:port` and proxy URLs
//! - Proxy chains tried in order, first success wins
//! - Bidirectional relay with read, write and idle-alive timeouts
//! - Exactly-once session accounting
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use port_mirror::config::{Config, MirrorConfig};
//! use port_mirror::{start_mirrors, DialerRegistry, SessionRegistry};
//!
//! #[tokio::main]
//! async fn main() -> port_mirror::Result<()> {
//!     let mut config = Config::default();
//!     config.mirrors.push(
//!         MirrorConfig::new("127.0.0.1:8080", "example.com:80")
//!             .with_proxy("socks5h://127.0.0.1:1080, direct"),
//!     );
//!
//!     let handles = start_mirrors(
//!         &config,
//!         Arc::new(SessionRegistry::new()),
//!         Arc::new(DialerRegistry::with_defaults()),
//!     )
//!     .await?;
//!
//!     for handle in handles {
//!         let _ = handle.await;
//!     }
//!     Ok(())
//! }
//! ```

// Public modules
pub mod common;
pub mod config;
pub mod net;
pub mod proxy;
pub mod tls;

use std::sync::Arc;

use tokio::task::JoinHandle;

// Re-export commonly used structures and functions for convenience
pub use common::{MirrorError, Result};
pub use net::{DialerRegistry, Endpoint, ProxySpec};
pub use proxy::{MirrorServer, Session, SessionRegistry};

/// Relay buffer size per direction
pub const BUFFER_SIZE: usize = 16 * 1024;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Bind every mirror of `config` and start its accept loop
///
/// All listeners are bound before any is started, so a bind failure leaves
/// nothing running.
///
/// # Errors
///
/// Returns the first bind error.
pub async fn start_mirrors(
    config: &config::Config,
    registry: Arc<SessionRegistry>,
    dialers: Arc<DialerRegistry>,
) -> Result<Vec<JoinHandle<()>>> {
    let mut servers = Vec::with_capacity(config.mirrors.len());

    for mirror in &config.mirrors {
        let server = MirrorServer::bind(mirror.clone(), Arc::clone(&registry), Arc::clone(&dialers))
            .await
            .map_err(|e| MirrorError::Config(format!("listen {} fail: {}", mirror.local, e)))?;
        servers.push(server);
    }

    Ok(servers.into_iter().map(MirrorServer::start).collect())
}
