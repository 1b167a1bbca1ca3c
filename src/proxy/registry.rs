//! Live session accounting

use std::sync::{Mutex, PoisonError};

use metrics::{counter, gauge};

/// Gauge of sessions currently counted
pub const SESSIONS_ACTIVE: &str = "port_mirror_sessions_active";

/// Counter of sessions ever started
pub const SESSIONS_TOTAL: &str = "port_mirror_sessions_total";

/// Counter of relayed bytes, labelled by direction
pub const BYTES_TOTAL: &str = "port_mirror_bytes_total";

/// Shared count of live sessions
///
/// Purely descriptive: used for log lines and metrics, never for control flow.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: Mutex<i64>,
}

impl SessionRegistry {
    /// Create a registry with no sessions
    pub fn new() -> Self {
        Self::default()
    }

    /// Count a new session, returning the updated count
    pub fn increment(&self) -> i64 {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        *active += 1;
        gauge!(SESSIONS_ACTIVE).set(*active as f64);
        counter!(SESSIONS_TOTAL).increment(1);
        *active
    }

    /// Uncount a finished session, returning the updated count
    pub fn decrement(&self) -> i64 {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        *active -= 1;
        gauge!(SESSIONS_ACTIVE).set(*active as f64);
        *active
    }

    /// Current count
    pub fn active(&self) -> i64 {
        *self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_increment_decrement() {
        let registry = SessionRegistry::new();
        assert_eq!(registry.increment(), 1);
        assert_eq!(registry.increment(), 2);
        assert_eq!(registry.decrement(), 1);
        assert_eq!(registry.active(), 1);
    }

    #[test]
    fn test_registries_are_independent() {
        let a = SessionRegistry::new();
        let b = SessionRegistry::new();
        a.increment();
        assert_eq!(a.active(), 1);
        assert_eq!(b.active(), 0);
    }

    #[test]
    fn test_concurrent_updates() {
        let registry = Arc::new(SessionRegistry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        registry.increment();
                        registry.decrement();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.active(), 0);
    }
}
