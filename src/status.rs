use std::collections::BTreeMap;

use crate::error::{MonitorError, Result};
use crate::types::{MetricKind, Severity};

/// Overall status is the most severe per-metric status.
pub fn aggregate(per_metric: &BTreeMap<MetricKind, Severity>) -> Result<Severity> {
    per_metric
        .values()
        .copied()
        .max()
        .ok_or(MonitorError::Aggregation)
}
