//! Direct TCP dialer

use std::io;
use std::net::SocketAddr;

use futures::future::BoxFuture;
use log::debug;
use tokio::net::{lookup_host, TcpStream};

use super::{check_network, BoxedStream, Dialer};
use crate::common::configure_tcp_stream;

/// Connects straight to the target
///
/// `tcp4` and `tcp6` only try addresses of the matching family.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectDialer;

impl Dialer for DirectDialer {
    fn dial<'a>(&'a self, network: &'a str, address: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>> {
        Box::pin(async move {
            check_network(network)?;

            let stream = match network {
                "tcp4" => connect_family(address, SocketAddr::is_ipv4).await?,
                "tcp6" => connect_family(address, SocketAddr::is_ipv6).await?,
                _ => TcpStream::connect(address).await?,
            };

            if let Err(e) = configure_tcp_stream(&stream) {
                debug!("Failed to set socket options for {}: {}", address, e);
            }

            Ok(Box::new(stream) as BoxedStream)
        })
    }
}

async fn connect_family(address: &str, family: fn(&SocketAddr) -> bool) -> io::Result<TcpStream> {
    let mut last_err = None;

    for addr in lookup_host(address).await?.filter(family) {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }

    Err(last_err.unwrap_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address of the requested family for {}", address),
        )
    }))
}
