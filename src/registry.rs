//! Live-connection accounting.

use std::sync::atomic::{AtomicI64, Ordering};

/// Process-wide count of live bridged connections.
///
/// Incremented when an upgraded connection is handed to the bridge loop and
/// decremented when the loop releases it, so the value always equals the
/// number of connections currently between accept and release. Lock-free;
/// [`snapshot`](Self::snapshot) is an eventually consistent read used for
/// logging only and carries no ordering guarantee relative to in-flight
/// adjustments.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: AtomicI64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: AtomicI64::new(0),
        }
    }

    /// Record a new connection; returns the count including it.
    pub fn increment(&self) -> i64 {
        self.connections.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a released connection; returns the remaining count.
    pub fn decrement(&self) -> i64 {
        self.connections.fetch_sub(1, Ordering::Relaxed) - 1
    }

    /// Current count, for observability.
    pub fn snapshot(&self) -> i64 {
        self.connections.load(Ordering::Relaxed)
    }
}
