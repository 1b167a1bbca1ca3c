//! Dialer capabilities
//!
//! A [`Dialer`] turns `(network, address)` into a connected duplex stream.
//! Proxy kinds are looked up by URL scheme in a [`DialerRegistry`]; each
//! factory receives a forward dialer used to reach the proxy itself, so
//! proxies compose.

mod direct;
pub mod http;
pub mod socks;

pub use direct::DirectDialer;
pub use http::HttpProxyDialer;
pub use socks::{SocksDialer, SocksVersion};

use std::collections::HashMap;
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use percent_encoding::percent_decode_str;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::time::timeout;
use url::Url;

use crate::common::{MirrorError, Result};
use crate::net::endpoint::STREAM_NETWORKS;

/// A duplex byte stream
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> AsyncStream for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

/// Type-erased duplex stream returned by every dialer
pub type BoxedStream = Box<dyn AsyncStream>;

/// Dial capability
pub trait Dialer: Send + Sync {
    /// Connect to `address` over `network`
    fn dial<'a>(&'a self, network: &'a str, address: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>>;

    /// Connect with a deadline
    ///
    /// On expiry the in-flight attempt is dropped, closing any partially
    /// open connection, and a `TimedOut` error is returned.
    fn dial_timeout<'a>(
        &'a self,
        network: &'a str,
        address: &'a str,
        deadline: Duration,
    ) -> BoxFuture<'a, io::Result<BoxedStream>> {
        Box::pin(async move {
            match timeout(deadline, self.dial(network, address)).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("dial {} timed out after {:?}", address, deadline),
                )),
            }
        })
    }
}

/// Factory producing a dialer for a proxy URL, given a forward dialer
pub type DialerFactory =
    Arc<dyn Fn(&Url, Arc<dyn Dialer>) -> Result<Arc<dyn Dialer>> + Send + Sync>;

/// Scheme to dialer factory registry
pub struct DialerRegistry {
    factories: HashMap<String, DialerFactory>,
    direct: Arc<dyn Dialer>,
}

impl DialerRegistry {
    /// Create an empty registry that only knows direct connections
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            direct: Arc::new(DirectDialer),
        }
    }

    /// Create a registry with the http, https and socks dialers registered
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        http::register(&mut registry);
        socks::register(&mut registry);
        registry
    }

    /// Replace the dialer used for `direct` entries and to reach proxies
    pub fn with_direct(mut self, direct: Arc<dyn Dialer>) -> Self {
        self.direct = direct;
        self
    }

    /// Register (or replace) the factory for a scheme
    pub fn register<F>(&mut self, scheme: &str, factory: F)
    where
        F: Fn(&Url, Arc<dyn Dialer>) -> Result<Arc<dyn Dialer>> + Send + Sync + 'static,
    {
        self.factories
            .insert(scheme.to_ascii_lowercase(), Arc::new(factory));
    }

    /// The direct dialer
    pub fn direct(&self) -> Arc<dyn Dialer> {
        Arc::clone(&self.direct)
    }

    /// Build a dialer for a proxy URL that reaches the proxy directly
    pub fn from_url(&self, url: &Url) -> Result<Arc<dyn Dialer>> {
        self.from_url_with_forward(url, self.direct())
    }

    /// Build a dialer for a proxy URL that reaches the proxy through `forward`
    pub fn from_url_with_forward(&self, url: &Url, forward: Arc<dyn Dialer>) -> Result<Arc<dyn Dialer>> {
        let factory = self
            .factories
            .get(url.scheme())
            .ok_or_else(|| MirrorError::UnsupportedScheme(url.scheme().to_string()))?;
        factory(url, forward)
    }

    /// Registered schemes, sorted
    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

impl Default for DialerRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for DialerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialerRegistry")
            .field("schemes", &self.schemes())
            .finish()
    }
}

/// Fail unless `network` is tcp, tcp4 or tcp6
pub fn check_network(network: &str) -> io::Result<()> {
    if STREAM_NETWORKS.contains(&network) {
        Ok(())
    } else {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            format!("network not implemented: {}", network),
        ))
    }
}

/// Percent-decoded `(username, password)` from the URL userinfo, if any
pub fn credentials(url: &Url) -> Option<(String, String)> {
    if url.username().is_empty() && url.password().is_none() {
        return None;
    }

    let decode = |s: &str| percent_decode_str(s).decode_utf8_lossy().into_owned();
    Some((decode(url.username()), url.password().map(decode).unwrap_or_default()))
}
