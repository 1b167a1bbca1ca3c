//! Outbound connection establishment
//!
//! Tries the entries of a proxy chain in declared order until one of them
//! reaches the target. An empty chain means a single direct attempt.

use std::fmt;
use std::io;
use std::time::Duration;

use log::{debug, warn};

use crate::common::{MirrorError, Result};
use crate::net::dialer::{BoxedStream, Dialer, DialerRegistry};
use crate::net::endpoint::{split_proxy_chain, Endpoint, ProxySpec};

/// An established outbound connection
pub struct Connection {
    /// Duplex stream to the target
    pub stream: BoxedStream,
    /// Chain entry that produced the stream, credentials redacted
    pub route: String,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("route", &self.route).finish()
    }
}

/// Connect to `target`, optionally through `proxy_chain`
///
/// Every attempt is bounded by `connect_timeout`. Failures of individual
/// chain entries are logged under `session_id` and the next entry is tried.
pub async fn connect(
    registry: &DialerRegistry,
    target: &str,
    proxy_chain: &str,
    connect_timeout: Duration,
    session_id: &str,
) -> Result<Connection> {
    let endpoint = Endpoint::parse(target)?;
    if !endpoint.is_stream() {
        return Err(MirrorError::UnsupportedNetwork(endpoint.network));
    }

    let address = endpoint.address();
    let entries = split_proxy_chain(proxy_chain);

    if entries.is_empty() {
        let direct = registry.direct();
        let stream = dial(direct.as_ref(), &endpoint.network, &address, connect_timeout).await?;
        return Ok(Connection {
            stream,
            route: ProxySpec::DIRECT.to_string(),
        });
    }

    let mut tried = Vec::with_capacity(entries.len());

    for entry in &entries {
        let spec = match ProxySpec::parse(entry) {
            Ok(spec) => spec,
            Err(e) => {
                warn!("[{}] proxy {} connect {} error: {}", session_id, entry, address, e);
                tried.push(entry.clone());
                continue;
            }
        };

        let route = spec.to_string();
        let attempt = match &spec {
            ProxySpec::Direct => {
                let direct = registry.direct();
                dial(direct.as_ref(), &endpoint.network, &address, connect_timeout).await
            }
            ProxySpec::Proxy(url) => match registry.from_url(url) {
                Ok(dialer) => dial(dialer.as_ref(), &endpoint.network, &address, connect_timeout).await,
                Err(e) => Err(e),
            },
        };

        match attempt {
            Ok(stream) => {
                debug!("[{}] connected {} via {}", session_id, address, route);
                return Ok(Connection { stream, route });
            }
            Err(e) => {
                warn!("[{}] proxy {} connect {} error: {}", session_id, route, address, e);
                tried.push(route);
            }
        }
    }

    warn!("[{}] all proxy connect {} fail", session_id, address);
    Err(MirrorError::AllProxiesFailed {
        target: address,
        tried: tried.join(", "),
    })
}

async fn dial(dialer: &dyn Dialer, network: &str, address: &str, deadline: Duration) -> Result<BoxedStream> {
    dialer
        .dial_timeout(network, address, deadline)
        .await
        .map_err(|e| match e.kind() {
            io::ErrorKind::TimedOut => MirrorError::ConnectTimeout(address.to_string()),
            _ => MirrorError::Io(e),
        })
}
