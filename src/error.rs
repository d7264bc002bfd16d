//! Error types for the sampling engine.
//!
//! Only startup data and bookkeeping failures are errors. Per-round reads of
//! volatile sources degrade to zero values instead (see `process` and
//! `system`).

/// Failures while registering a monitored process.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid PID 0")]
    InvalidPid,

    #[error("unable to allocate bookkeeping for {requested} monitored processes")]
    Allocation { requested: usize },
}

/// Fatal errors of the monitor.
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("unable to read {source_name}: {reason}")]
    SourceUnavailable { source_name: String, reason: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("failed to write report: {0}")]
    Report(#[from] std::io::Error),
}

impl MonitorError {
    pub(crate) fn unavailable(source_name: impl Into<String>, reason: impl Into<String>) -> Self {
        MonitorError::SourceUnavailable {
            source_name: source_name.into(),
            reason: reason.into(),
        }
    }
}
