use thiserror::Error;

use crate::types::MetricKind;

/// Failure reported by a [`SampleProvider`](crate::provider::SampleProvider).
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("sample source unavailable: {0}")]
    Unavailable(String),

    #[error("sample fetch timed out after {0} ms")]
    Timeout(u64),

    #[error("sample set is missing tracked metric {0}")]
    Incomplete(MetricKind),

    #[error("sample for {kind} filed under {key}")]
    Mislabeled { key: MetricKind, kind: MetricKind },
}

#[derive(Debug, Clone, Error)]
pub enum MonitorError {
    #[error("invalid sample for {kind}: {value}")]
    InvalidSample { kind: MetricKind, value: f64 },

    #[error("cannot aggregate status: no metrics supplied")]
    Aggregation,

    #[error("provider failure: {0}")]
    ProviderFailure(#[from] ProviderError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("no active session")]
    SessionInactive,
}

impl MonitorError {
    /// Recoverable errors leave the last published snapshot authoritative.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, MonitorError::ProviderFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
