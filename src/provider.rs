use std::future::Future;

use crate::error::ProviderError;
use crate::types::SampleSet;

/// Source of sensor readings consumed by the refresh scheduler.
///
/// Any error is treated as a transient failure; the scheduler never retries
/// within one refresh.
pub trait SampleProvider: Send + Sync + 'static {
    fn fetch_samples(&self) -> impl Future<Output = Result<SampleSet, ProviderError>> + Send;
}
