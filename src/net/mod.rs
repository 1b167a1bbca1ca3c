//! Outbound networking
//!
//! Endpoint parsing, dialer capabilities and the proxy chain.

pub mod chain;
pub mod dialer;
pub mod endpoint;

pub use chain::{connect, Connection};
pub use dialer::{BoxedStream, Dialer, DialerRegistry};
pub use endpoint::{split_proxy_chain, Endpoint, ProxySpec};
