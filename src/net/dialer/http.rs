//! HTTP(S) CONNECT tunnel dialer

use std::fmt;
use std::io;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::BoxFuture;
use log::debug;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use url::Url;

use super::{check_network, credentials, BoxedStream, Dialer, DialerRegistry};
use crate::common::{MirrorError, Result};
use crate::net::endpoint::Endpoint;
use crate::tls::connect_tls;

/// User-Agent sent with every CONNECT request
pub const USER_AGENT: &str = "port-mirror";

/// Upper bound on the proxy response head
pub const MAX_RESPONSE_HEAD: usize = 8192;

const MAX_HEADERS: usize = 64;

/// Tunnels through an HTTP or HTTPS proxy with the CONNECT method
pub struct HttpProxyDialer {
    proxy: Endpoint,
    tls: bool,
    auth: Option<String>,
    forward: Arc<dyn Dialer>,
}

impl HttpProxyDialer {
    /// Build a dialer from an `http://` or `https://` proxy URL
    ///
    /// The proxy itself is reached through `forward`.
    pub fn from_url(url: &Url, forward: Arc<dyn Dialer>) -> Result<Self> {
        let tls = match url.scheme() {
            "http" => false,
            "https" => true,
            other => return Err(MirrorError::UnsupportedScheme(other.to_string())),
        };

        let proxy = Endpoint::from_url(url)?;
        let auth = credentials(url).map(|(user, pass)| basic_auth(&user, &pass));

        Ok(Self {
            proxy,
            tls,
            auth,
            forward,
        })
    }

    async fn connect_tunnel(&self, address: &str) -> io::Result<BoxedStream> {
        let conn = self.forward.dial("tcp", &self.proxy.address()).await?;

        let conn: BoxedStream = if self.tls {
            let stream = connect_tls(&self.proxy.host, conn)
                .await
                .map_err(io::Error::other)?;
            Box::new(stream)
        } else {
            conn
        };

        let mut reader = BufReader::new(conn);
        let request = build_connect_request(address, self.auth.as_deref());
        reader.get_mut().write_all(request.as_bytes()).await?;
        reader.get_mut().flush().await?;

        let head = read_response_head(&mut reader).await?;
        let (code, reason) = parse_status(&head)?;
        if code != 200 {
            return Err(io::Error::other(MirrorError::Proxy(format!(
                "{} refused CONNECT {}: {} {}",
                self.proxy, address, code, reason
            ))));
        }

        debug!("Tunnel to {} established via {}", address, self.proxy);

        // Bytes the proxy sent after the head stay buffered in the reader
        Ok(Box::new(reader))
    }
}

impl Dialer for HttpProxyDialer {
    fn dial<'a>(&'a self, network: &'a str, address: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>> {
        Box::pin(async move {
            check_network(network)?;
            self.connect_tunnel(address).await
        })
    }
}

impl fmt::Debug for HttpProxyDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProxyDialer")
            .field("proxy", &self.proxy)
            .field("tls", &self.tls)
            .field("auth", &self.auth.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Register the `http` and `https` schemes
pub fn register(registry: &mut DialerRegistry) {
    for scheme in ["http", "https"] {
        registry.register(scheme, |url, forward| {
            Ok(Arc::new(HttpProxyDialer::from_url(url, forward)?) as Arc<dyn Dialer>)
        });
    }
}

/// `base64(user:pass)` for a Basic authorization header
pub fn basic_auth(user: &str, pass: &str) -> String {
    STANDARD.encode(format!("{}:{}", user, pass))
}

fn build_connect_request(address: &str, auth: Option<&str>) -> String {
    let mut request = format!(
        "CONNECT {address} HTTP/1.1\r\nHost: {address}\r\nUser-Agent: {USER_AGENT}\r\n"
    );
    if let Some(auth) = auth {
        request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", auth));
    }
    request.push_str("\r\n");
    request
}

/// Read up to and including the blank line that ends the response head
///
/// Nothing past the head is consumed from `reader`.
async fn read_response_head<R>(reader: &mut R) -> io::Result<Vec<u8>>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = Vec::new();

    loop {
        let remaining = MAX_RESPONSE_HEAD - head.len();
        if remaining == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "proxy response head too large",
            ));
        }

        let start = head.len();
        let n = (&mut *reader)
            .take(remaining as u64)
            .read_until(b'\n', &mut head)
            .await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "proxy closed the connection before responding",
            ));
        }

        let line = &head[start..];
        if line == b"\r\n" || line == b"\n" {
            if start == 0 {
                head.clear();
                continue;
            }
            return Ok(head);
        }
    }
}

fn parse_status(head: &[u8]) -> io::Result<(u16, String)> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut response = httparse::Response::new(&mut headers);

    match response.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "incomplete proxy response head",
            ))
        }
        Err(e) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("malformed proxy response: {}", e),
            ))
        }
    }

    let code = response
        .code
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "missing status code"))?;
    Ok((code, response.reason.unwrap_or_default().to_string()))
}
