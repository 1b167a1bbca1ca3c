//! Listener loop
//!
//! One listener per mirror. Every accepted connection gets its own
//! [`Session`]; accept failures are retried after a fixed delay.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info};
use tokio::net::{lookup_host, TcpListener};
use tokio::task::JoinHandle;
use tokio::time::sleep;

use super::registry::SessionRegistry;
use super::session::Session;
use crate::common::{configure_tcp_stream, MirrorError, Result};
use crate::config::MirrorConfig;
use crate::net::{DialerRegistry, Endpoint};

/// Delay before retrying a failed accept
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(500);

/// A bound mirror listener
pub struct MirrorServer {
    config: Arc<MirrorConfig>,
    listener: TcpListener,
    registry: Arc<SessionRegistry>,
    dialers: Arc<DialerRegistry>,
}

impl MirrorServer {
    /// Bind the local endpoint of `config`
    ///
    /// # Errors
    ///
    /// Fails if the local endpoint does not parse, is not tcp family, or
    /// cannot be bound.
    pub async fn bind(
        config: MirrorConfig,
        registry: Arc<SessionRegistry>,
        dialers: Arc<DialerRegistry>,
    ) -> Result<Self> {
        let endpoint = Endpoint::parse(&config.local)?;
        if !endpoint.is_stream() {
            return Err(MirrorError::UnsupportedNetwork(endpoint.network));
        }

        let listener = bind_listener(&endpoint).await?;
        info!(
            "mirror listening on {} -> target {}{}",
            listener.local_addr()?,
            config.target,
            if config.proxy.is_empty() {
                String::new()
            } else {
                format!(" via [{}]", redacted_chain(&config.proxy))
            }
        );

        Ok(Self {
            config: Arc::new(config),
            listener,
            registry,
            dialers,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever
    pub async fn run(self) {
        loop {
            match self.listener.accept().await {
                Ok((stream, client)) => {
                    debug!("accepted {} on {}", client, self.config.local);
                    if let Err(e) = configure_tcp_stream(&stream) {
                        debug!("Failed to set socket options for {}: {}", client, e);
                    }

                    let session = Session::new(
                        Arc::clone(&self.config),
                        Arc::clone(&self.registry),
                        Arc::clone(&self.dialers),
                    );
                    session.start(stream);
                }
                // Mostly descriptor exhaustion (EMFILE/ENFILE), which a test
                // cannot provoke without starving the whole process
                Err(e) => {
                    error!(
                        "accept on {} failed: {}, retrying in {:?}",
                        self.config.local, e, ACCEPT_RETRY_DELAY
                    );
                    sleep(ACCEPT_RETRY_DELAY).await;
                }
            }
        }
    }

    /// Run the accept loop on its own task
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

async fn bind_listener(endpoint: &Endpoint) -> Result<TcpListener> {
    let address = endpoint.address();

    let family: fn(&SocketAddr) -> bool = match endpoint.network.as_str() {
        "tcp4" => SocketAddr::is_ipv4,
        "tcp6" => SocketAddr::is_ipv6,
        _ => return Ok(TcpListener::bind(&address).await?),
    };

    let mut last_err = None;
    for addr in lookup_host(&address).await?.filter(family) {
        match TcpListener::bind(addr).await {
            Ok(listener) => return Ok(listener),
            Err(e) => last_err = Some(e),
        }
    }

    Err(MirrorError::Io(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no {} address for {}", endpoint.network, address),
        )
    })))
}

fn redacted_chain(chain: &str) -> String {
    crate::net::split_proxy_chain(chain)
        .iter()
        .map(|entry| match crate::net::ProxySpec::parse(entry) {
            Ok(spec) => spec.to_string(),
            Err(_) => entry.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
