//! Mirror service module
//!
//! Listener loops, relay sessions and live session accounting.

mod registry;
pub mod server;
pub mod session;

pub use registry::{SessionRegistry, BYTES_TOTAL, SESSIONS_ACTIVE, SESSIONS_TOTAL};
pub use server::{MirrorServer, ACCEPT_RETRY_DELAY};
pub use session::{Direction, ExitReason, Session};
