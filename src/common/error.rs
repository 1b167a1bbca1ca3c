//! Error handling module
//!
//! This module defines the error types and result type aliases used in the application.

use thiserror::Error;
use std::io;

/// Port mirror error type
#[derive(Error, Debug)]
pub enum MirrorError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// OpenSSL error
    #[error("OpenSSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),

    /// TLS handshake error
    #[error("TLS handshake error: {0}")]
    TlsHandshake(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed endpoint or proxy string
    #[error("Invalid endpoint '{input}': {reason}")]
    Endpoint {
        /// The offending input string
        input: String,
        /// Why it was rejected
        reason: String,
    },

    /// Target network is not stream oriented
    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    /// No dialer registered for a proxy scheme
    #[error("Unsupported proxy scheme: {0}")]
    UnsupportedScheme(String),

    /// Proxy refused or broke the tunnel
    #[error("Proxy error: {0}")]
    Proxy(String),

    /// Connect deadline expired
    #[error("Connect to {0} timed out")]
    ConnectTimeout(String),

    /// Every entry of the proxy chain failed
    #[error("All proxies failed to connect {target} (tried: {tried})")]
    AllProxiesFailed {
        /// Target address
        target: String,
        /// Entries tried, in order
        tried: String,
    },
}

impl MirrorError {
    /// Build an endpoint error naming the offending string
    pub fn endpoint(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Endpoint {
            input: input.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias
///
/// This is a `Result` type alias that uses our custom `MirrorError`.
pub type Result<T> = std::result::Result<T, MirrorError>;
