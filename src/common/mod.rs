//! Common module
//!
//! This module contains shared errors, logging setup, and utility functions used throughout the application.

pub mod error;
pub mod log;
pub mod net;

// Re-export commonly used types and functions
pub use error::{MirrorError, Result};
pub use log::{init_logger, LogOutput};
pub use net::{configure_tcp_stream, random_session_id, SESSION_ID_LEN};
