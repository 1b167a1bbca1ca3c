//! SOCKS4, SOCKS4a and SOCKS5 dialers

use std::borrow::Cow;
use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use futures::future::BoxFuture;
use log::debug;
use tokio::net::lookup_host;
use tokio_socks::tcp::{Socks4Stream, Socks5Stream};
use tokio_socks::TargetAddr;
use url::Url;

use super::{check_network, credentials, BoxedStream, Dialer, DialerRegistry};
use crate::common::{MirrorError, Result};
use crate::net::endpoint::Endpoint;

/// SOCKS protocol flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocksVersion {
    /// SOCKS4, IPv4 resolved locally
    V4,
    /// SOCKS4a, names resolved by the proxy
    V4a,
    /// SOCKS5, names resolved locally
    V5,
    /// SOCKS5, names resolved by the proxy
    V5h,
}

impl SocksVersion {
    /// Map a URL scheme to a version
    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme {
            "socks4" => Some(Self::V4),
            "socks4a" => Some(Self::V4a),
            "socks5" => Some(Self::V5),
            "socks5h" => Some(Self::V5h),
            _ => None,
        }
    }

    /// Whether host names are sent to the proxy unresolved
    pub fn remote_dns(self) -> bool {
        matches!(self, Self::V4a | Self::V5h)
    }

    fn scheme(self) -> &'static str {
        match self {
            Self::V4 => "socks4",
            Self::V4a => "socks4a",
            Self::V5 => "socks5",
            Self::V5h => "socks5h",
        }
    }
}

impl fmt::Display for SocksVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.scheme())
    }
}

/// Connects through a SOCKS proxy
///
/// Userinfo in the proxy URL becomes username/password for SOCKS5 and the
/// user id for SOCKS4.
pub struct SocksDialer {
    version: SocksVersion,
    proxy: Endpoint,
    auth: Option<(String, String)>,
    forward: Arc<dyn Dialer>,
}

impl SocksDialer {
    /// Build a dialer from a `socks4`, `socks4a`, `socks5` or `socks5h` URL
    pub fn from_url(url: &Url, forward: Arc<dyn Dialer>) -> Result<Self> {
        let version = SocksVersion::from_scheme(url.scheme())
            .ok_or_else(|| MirrorError::UnsupportedScheme(url.scheme().to_string()))?;

        Ok(Self {
            version,
            proxy: Endpoint::from_url(url)?,
            auth: credentials(url).filter(|(user, _)| !user.is_empty()),
            forward,
        })
    }

    async fn target_addr(&self, address: &str) -> io::Result<TargetAddr<'static>> {
        let target = Endpoint::parse(address)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        if let Ok(ip) = target.host.parse::<IpAddr>() {
            return Ok(TargetAddr::Ip(SocketAddr::new(ip, target.port)));
        }

        if self.version.remote_dns() {
            return Ok(TargetAddr::Domain(Cow::Owned(target.host), target.port));
        }

        let mut addrs = lookup_host((target.host.as_str(), target.port)).await?;
        let resolved = match self.version {
            SocksVersion::V4 => addrs.find(SocketAddr::is_ipv4),
            _ => addrs.next(),
        };

        resolved.map(TargetAddr::Ip).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no usable address for {} via {}", address, self.version),
            )
        })
    }

    async fn connect(&self, address: &str) -> io::Result<BoxedStream> {
        let target = self.target_addr(address).await?;
        let conn = self.forward.dial("tcp", &self.proxy.address()).await?;

        let stream: BoxedStream = match (self.version, &self.auth) {
            (SocksVersion::V5 | SocksVersion::V5h, Some((user, pass))) => Box::new(
                Socks5Stream::connect_with_password_and_socket(conn, target, user, pass)
                    .await
                    .map_err(socks_error)?,
            ),
            (SocksVersion::V5 | SocksVersion::V5h, None) => Box::new(
                Socks5Stream::connect_with_socket(conn, target)
                    .await
                    .map_err(socks_error)?,
            ),
            (SocksVersion::V4 | SocksVersion::V4a, Some((user, _))) => Box::new(
                Socks4Stream::connect_with_userid_and_socket(conn, target, user)
                    .await
                    .map_err(socks_error)?,
            ),
            (SocksVersion::V4 | SocksVersion::V4a, None) => Box::new(
                Socks4Stream::connect_with_socket(conn, target)
                    .await
                    .map_err(socks_error)?,
            ),
        };

        debug!("{} tunnel to {} established via {}", self.version, address, self.proxy.address());
        Ok(stream)
    }
}

impl Dialer for SocksDialer {
    fn dial<'a>(&'a self, network: &'a str, address: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>> {
        Box::pin(async move {
            check_network(network)?;
            self.connect(address).await
        })
    }
}

impl fmt::Debug for SocksDialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocksDialer")
            .field("version", &self.version)
            .field("proxy", &self.proxy)
            .field("auth", &self.auth.as_ref().map(|(user, _)| user))
            .finish()
    }
}

fn socks_error(err: tokio_socks::Error) -> io::Error {
    match err {
        tokio_socks::Error::Io(e) => e,
        other => io::Error::other(MirrorError::Proxy(other.to_string())),
    }
}

/// Register the four SOCKS schemes
pub fn register(registry: &mut DialerRegistry) {
    for scheme in ["socks4", "socks4a", "socks5", "socks5h"] {
        registry.register(scheme, |url, forward| {
            Ok(Arc::new(SocksDialer::from_url(url, forward)?) as Arc<dyn Dialer>)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::dialer::test_support::RecordingDialer;
    use crate::net::dialer::DirectDialer;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn dialer(url: &str) -> SocksDialer {
        SocksDialer::from_url(&Url::parse(url).unwrap(), Arc::new(DirectDialer)).unwrap()
    }

    /// Minimal SOCKS5 server: optional user/pass auth, CONNECT, then echo.
    /// Returns the requested destination as `(atyp, addr bytes, port)`.
    async fn socks5_server(mut stream: TcpStream, creds: Option<(&str, &str)>) -> (u8, Vec<u8>, u16) {
        let mut head = [0u8; 2];
        stream.read_exact(&mut head).await.unwrap();
        assert_eq!(head[0], 5);
        let mut methods = vec![0u8; head[1] as usize];
        stream.read_exact(&mut methods).await.unwrap();

        match creds {
            Some((user, pass)) => {
                assert!(methods.contains(&2));
                stream.write_all(&[5, 2]).await.unwrap();

                let mut ver_len = [0u8; 2];
                stream.read_exact(&mut ver_len).await.unwrap();
                let mut got_user = vec![0u8; ver_len[1] as usize];
                stream.read_exact(&mut got_user).await.unwrap();
                let mut plen = [0u8; 1];
                stream.read_exact(&mut plen).await.unwrap();
                let mut got_pass = vec![0u8; plen[0] as usize];
                stream.read_exact(&mut got_pass).await.unwrap();
                assert_eq!(got_user, user.as_bytes());
                assert_eq!(got_pass, pass.as_bytes());
                stream.write_all(&[1, 0]).await.unwrap();
            }
            None => {
                assert!(methods.contains(&0));
                stream.write_all(&[5, 0]).await.unwrap();
            }
        }

        let mut request = [0u8; 4];
        stream.read_exact(&mut request).await.unwrap();
        assert_eq!(&request[..3], &[5, 1, 0]);
        let atyp = request[3];
        let addr = match atyp {
            1 => {
                let mut ip = vec![0u8; 4];
                stream.read_exact(&mut ip).await.unwrap();
                ip
            }
            3 => {
                let mut len = [0u8; 1];
                stream.read_exact(&mut len).await.unwrap();
                let mut name = vec![0u8; len[0] as usize];
                stream.read_exact(&mut name).await.unwrap();
                name
            }
            other => panic!("unexpected address type {}", other),
        };
        let mut port = [0u8; 2];
        stream.read_exact(&mut port).await.unwrap();

        stream.write_all(&[5, 0, 0, 1, 127, 0, 0, 1, 0, 0]).await.unwrap();

        let mut buf = [0u8; 4];
        stream.read_exact(&mut buf).await.unwrap();
        stream.write_all(&buf).await.unwrap();

        (atyp, addr, u16::from_be_bytes(port))
    }

    #[test]
    fn test_from_url() {
        let d = dialer("socks5h://proxy");
        assert_eq!(d.version, SocksVersion::V5h);
        assert_eq!(d.proxy.port, 1080);
        assert!(d.auth.is_none());

        let d = dialer("socks4://bob@proxy:9050");
        assert_eq!(d.version, SocksVersion::V4);
        assert_eq!(d.auth, Some(("bob".to_string(), String::new())));

        let url = Url::parse("http://proxy:3128").unwrap();
        assert!(matches!(
            SocksDialer::from_url(&url, Arc::new(DirectDialer)),
            Err(MirrorError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_remote_dns() {
        assert!(SocksVersion::V5h.remote_dns());
        assert!(SocksVersion::V4a.remote_dns());
        assert!(!SocksVersion::V5.remote_dns());
        assert!(!SocksVersion::V4.remote_dns());
        assert_eq!(SocksVersion::from_scheme("socks5h"), Some(SocksVersion::V5h));
        assert_eq!(SocksVersion::from_scheme("socks6"), None);
    }

    #[tokio::test]
    async fn test_target_addr() {
        let d = dialer("socks5h://proxy");
        match d.target_addr("db.internal:5432").await.unwrap() {
            TargetAddr::Domain(host, port) => {
                assert_eq!(host, "db.internal");
                assert_eq!(port, 5432);
            }
            other => panic!("expected domain, got {:?}", other),
        }

        let d = dialer("socks5://proxy");
        match d.target_addr("[::1]:22").await.unwrap() {
            TargetAddr::Ip(addr) => assert_eq!(addr, "[::1]:22".parse().unwrap()),
            other => panic!("expected ip, got {:?}", other),
        }

        assert!(d.target_addr("no-port").await.is_err());
    }

    #[tokio::test]
    async fn test_socks5h_sends_domain() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            socks5_server(stream, None).await
        });

        let d = dialer(&format!("socks5h://{}", addr));
        let mut conn = d.dial("tcp", "db.internal:5432").await.unwrap();
        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        let (atyp, host, port) = server.await.unwrap();
        assert_eq!(atyp, 3);
        assert_eq!(host, b"db.internal");
        assert_eq!(port, 5432);
    }

    #[tokio::test]
    async fn test_proxy_reached_through_forward() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            socks5_server(stream, None).await
        });

        let forward = Arc::new(RecordingDialer::default());
        let url = Url::parse(&format!("socks5h://{}", addr)).unwrap();
        let d = DialerRegistry::with_defaults()
            .from_url_with_forward(&url, Arc::clone(&forward) as Arc<dyn Dialer>)
            .unwrap();

        let mut conn = d.dial("tcp", "db.internal:5432").await.unwrap();
        conn.write_all(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        let (_, host, _) = server.await.unwrap();
        assert_eq!(host, b"db.internal");
        assert_eq!(*forward.calls.lock().unwrap(), vec![addr.to_string()]);
    }

    #[tokio::test]
    async fn test_socks5_password_auth() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            socks5_server(stream, Some(("alice", "s3cret"))).await
        });

        let d = dialer(&format!("socks5://alice:s3cret@{}", addr));
        let mut conn = d.dial("tcp", "10.1.2.3:80").await.unwrap();
        conn.write_all(b"pong").await.unwrap();
        let mut buf = [0u8; 4];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"pong");

        let (atyp, ip, port) = server.await.unwrap();
        assert_eq!(atyp, 1);
        assert_eq!(ip, vec![10, 1, 2, 3]);
        assert_eq!(port, 80);
    }

    #[tokio::test]
    async fn test_socks4_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 8];
            stream.read_exact(&mut request).await.unwrap();

            let mut user_id = Vec::new();
            let mut byte = [0u8; 1];
            loop {
                stream.read_exact(&mut byte).await.unwrap();
                if byte[0] == 0 {
                    break;
                }
                user_id.push(byte[0]);
            }

            stream.write_all(&[0, 90, 0, 0, 0, 0, 0, 0]).await.unwrap();
            stream.write_all(b"ready").await.unwrap();
            (request, user_id)
        });

        let d = dialer(&format!("socks4://bob@{}", addr));
        let mut conn = d.dial("tcp", "192.168.1.10:8080").await.unwrap();
        let mut buf = [0u8; 5];
        conn.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ready");

        let (request, user_id) = server.await.unwrap();
        assert_eq!(request[0], 4);
        assert_eq!(request[1], 1);
        assert_eq!(u16::from_be_bytes([request[2], request[3]]), 8080);
        assert_eq!(&request[4..], &[192, 168, 1, 10]);
        assert_eq!(user_id, b"bob");
    }

    #[tokio::test]
    async fn test_rejected_by_proxy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 9];
            stream.read_exact(&mut request).await.unwrap();
            stream.write_all(&[0, 91, 0, 0, 0, 0, 0, 0]).await.unwrap();
        });

        let d = dialer(&format!("socks4://{}", addr));
        assert!(d.dial("tcp", "192.168.1.10:8080").await.is_err());
        server.await.unwrap();
    }
}
