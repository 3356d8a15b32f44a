use chrono::Utc;
use rand::Rng;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use crate::error::ProviderError;
use crate::provider::SampleProvider;
use crate::types::{MetricKind, MetricSample, SampleSet};

/// Provider that makes up plausible facility readings.
pub struct SimulatedProvider {
    latency: Duration,
    failure_rate: f64,
    sequence: AtomicU32,
}

impl SimulatedProvider {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            failure_rate: 0.0,
            sequence: AtomicU32::new(0),
        }
    }

    /// Fraction of fetches (0.0..=1.0) that fail, for exercising stale-data paths.
    pub fn with_failure_rate(mut self, failure_rate: f64) -> Self {
        self.failure_rate = failure_rate.clamp(0.0, 1.0);
        self
    }

    pub fn fetches(&self) -> u32 {
        self.sequence.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedProvider {
    fn default() -> Self {
        Self::new(Duration::from_millis(800))
    }
}

pub fn generate_samples() -> SampleSet {
    let mut rng = rand::thread_rng();
    let now = Utc::now();
    MetricKind::ALL
        .iter()
        .map(|&kind| {
            let (lo, width) = match kind {
                MetricKind::Temperature => (20.0, 15.0), // 20-35 °C
                MetricKind::Humidity => (40.0, 30.0),    // 40-70 %
                MetricKind::AirQuality => (0.0, 100.0),  // lower is better
                MetricKind::Pressure => (990.0, 10.0),   // 990-1000 hPa
                MetricKind::Noise => (50.0, 30.0),       // 50-80 dB
            };
            let value = lo + rng.gen::<f64>() * width;
            let sample = MetricSample {
                kind,
                value: (value * 10.0).round() / 10.0,
                observed_at: now,
            };
            (kind, sample)
        })
        .collect()
}

impl SampleProvider for SimulatedProvider {
    async fn fetch_samples(&self) -> Result<SampleSet, ProviderError> {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failure_rate > 0.0 && rand::random::<f64>() < self.failure_rate {
            tracing::debug!(sequence, "simulated provider dropping fetch");
            return Err(ProviderError::Unavailable(format!(
                "simulated outage on fetch {}",
                sequence
            )));
        }
        let samples = generate_samples();
        tracing::debug!(sequence, count = samples.len(), "simulated samples generated");
        Ok(samples)
    }
}
