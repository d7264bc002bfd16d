//! Cooperative shutdown.
//!
//! The sampling loop polls a [`CancellationToken`] at fixed checkpoints. Who
//! triggers it (a signal handler, a test, another thread) is up to the
//! caller. A second request while the first is pending means "quit now".

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// What a shutdown request amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownRequest {
    /// First request: finish the current step, drain, stop.
    Graceful,
    /// Repeated request: stop immediately without cleanup.
    Forced,
}

/// Shared, cloneable shutdown flag counting how often it was requested.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    requests: Arc<AtomicU32>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a shutdown request.
    pub fn request(&self) -> ShutdownRequest {
        match self.requests.fetch_add(1, Ordering::SeqCst) {
            0 => ShutdownRequest::Graceful,
            _ => ShutdownRequest::Forced,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.requests.load(Ordering::SeqCst) > 0
    }

    pub fn is_forced(&self) -> bool {
        self.requests.load(Ordering::SeqCst) > 1
    }
}
