//! TLS client side used to reach HTTPS proxies
//!
//! Certificate verification is disabled: the proxy is trusted out of band.
//! This is a deliberate trade-off, do not reuse this connector for targets.

use std::net::IpAddr;
use std::pin::Pin;

use log::debug;
use once_cell::sync::OnceCell;
use openssl::ssl::{SslConnector, SslMethod, SslVerifyMode};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_openssl::SslStream;

use crate::common::{MirrorError, Result};

static CONNECTOR: OnceCell<SslConnector> = OnceCell::new();

/// Create a TLS connector that does not verify the peer certificate
pub fn create_tls_connector() -> Result<SslConnector> {
    let mut builder = SslConnector::builder(SslMethod::tls())?;
    builder.set_verify(SslVerifyMode::NONE);
    Ok(builder.build())
}

fn shared_connector() -> Result<&'static SslConnector> {
    CONNECTOR.get_or_try_init(create_tls_connector)
}

/// Perform a TLS client handshake over `stream`
///
/// SNI carries `domain` unless it is an IP literal. Dropping the returned
/// error drops the stream, which closes the underlying connection.
pub async fn connect_tls<S>(domain: &str, stream: S) -> Result<SslStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut config = shared_connector()?.configure()?;
    config.set_verify_hostname(false);
    config.set_use_server_name_indication(domain.parse::<IpAddr>().is_err());

    let ssl = config.into_ssl(domain)?;
    let mut stream = SslStream::new(ssl, stream)?;

    Pin::new(&mut stream)
        .connect()
        .await
        .map_err(|e| MirrorError::TlsHandshake(e.to_string()))?;

    debug!("TLS handshake with {} successful", domain);
    Ok(stream)
}
