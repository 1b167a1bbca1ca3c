//! TLS handling module
//!
//! Client side TLS for HTTPS proxies.

mod connector;

pub use connector::{connect_tls, create_tls_connector};

#[cfg(test)]
pub(crate) use connector::test_support;
