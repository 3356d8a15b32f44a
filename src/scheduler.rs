//! Periodic and on-demand sensor refresh.
//!
//! [`RefreshScheduler`] is the only writer of the [`SystemSnapshot`]. Each
//! successful refresh replaces the published snapshot as a whole through a
//! `watch` channel; a failed one leaves it untouched and marks the data
//! stale. At most one refresh runs at a time: a request that arrives while
//! another is in flight is coalesced and reports [`RefreshOutcome::Coalesced`].

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::{MonitorError, ProviderError, Result};
use crate::notify::{Notification, NotificationSink};
use crate::provider::SampleProvider;
use crate::status;
use crate::thresholds::BandTable;
use crate::types::{MetricKind, SampleSet, SystemSnapshot};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct RefreshSettings {
    pub tracked: Vec<MetricKind>,
    pub fetch_timeout: Option<Duration>,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            tracked: MetricKind::TRACKED.to_vec(),
            fetch_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RefreshOutcome {
    Published(Arc<SystemSnapshot>),
    /// Another refresh was already in flight; nothing was fetched.
    Coalesced,
}

impl RefreshOutcome {
    pub fn snapshot(&self) -> Option<&Arc<SystemSnapshot>> {
        match self {
            RefreshOutcome::Published(snapshot) => Some(snapshot),
            RefreshOutcome::Coalesced => None,
        }
    }
}

pub type SnapshotReceiver = watch::Receiver<Option<Arc<SystemSnapshot>>>;

pub struct RefreshScheduler<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for RefreshScheduler<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<P> {
    provider: P,
    bands: BandTable,
    settings: RefreshSettings,
    in_flight: AtomicBool,
    stale: AtomicBool,
    published: watch::Sender<Option<Arc<SystemSnapshot>>>,
    sink: Arc<dyn NotificationSink>,
}

/// Clears the in-flight flag however the refresh ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P: SampleProvider> RefreshScheduler<P> {
    pub fn new(
        provider: P,
        bands: BandTable,
        settings: RefreshSettings,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self> {
        if settings.tracked.is_empty() {
            return Err(MonitorError::Config("no tracked metrics configured".into()));
        }
        for kind in &settings.tracked {
            bands.get(*kind)?;
        }
        let (published, _) = watch::channel(None);
        Ok(Self {
            inner: Arc::new(Inner {
                provider,
                bands,
                settings,
                in_flight: AtomicBool::new(false),
                stale: AtomicBool::new(false),
                published,
                sink,
            }),
        })
    }

    /// Latest published snapshot, `None` before the first successful refresh.
    pub fn snapshot(&self) -> Option<Arc<SystemSnapshot>> {
        self.inner.published.borrow().clone()
    }

    pub fn subscribe(&self) -> SnapshotReceiver {
        self.inner.published.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// True after a failed refresh until the next successful one.
    pub fn is_stale(&self) -> bool {
        self.inner.stale.load(Ordering::Acquire)
    }

    pub fn bands(&self) -> &BandTable {
        &self.inner.bands
    }

    pub fn provider(&self) -> &P {
        &self.inner.provider
    }

    pub async fn refresh_now(&self) -> Result<RefreshOutcome> {
        let inner = &self.inner;
        if inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("refresh already in flight, coalescing request");
            return Ok(RefreshOutcome::Coalesced);
        }
        let _guard = InFlightGuard(&inner.in_flight);
        let started = Instant::now();

        let result = match inner.fetch().await {
            Ok(samples) => inner.build_snapshot(samples),
            Err(err) => Err(MonitorError::from(err)),
        };

        match result {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                inner.published.send_replace(Some(Arc::clone(&snapshot)));
                inner.stale.store(false, Ordering::Release);
                tracing::info!(
                    overall = %snapshot.overall_severity,
                    samples = snapshot.samples.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "snapshot published"
                );
                Ok(RefreshOutcome::Published(snapshot))
            }
            Err(err) => {
                inner.stale.store(true, Ordering::Release);
                let shown = self
                    .snapshot()
                    .map(|s| format!("Showing readings from {}", s.last_updated_label()))
                    .unwrap_or_else(|| "No readings available yet".to_string());
                tracing::warn!(error = %err, "refresh failed, keeping previous snapshot");
                inner.sink.notify(Notification::destructive(
                    "Sensor refresh failed",
                    format!("{}: {}", shown, err),
                ));
                Err(err)
            }
        }
    }

    /// Starts refreshing every `every`, beginning immediately.
    pub fn spawn_periodic(&self, every: Duration) -> Result<PeriodicRefresh> {
        if every.is_zero() {
            return Err(MonitorError::Config("refresh interval must be non-zero".into()));
        }
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let scheduler = self.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(interval_secs = every.as_secs(), "periodic refresh started");

            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        tracing::info!("periodic refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match scheduler.refresh_now().await {
                            Ok(RefreshOutcome::Published(_)) => {}
                            Ok(RefreshOutcome::Coalesced) => {
                                tracing::debug!("scheduled refresh coalesced with one in flight");
                            }
                            Err(e) => {
                                tracing::error!(error = %e, "scheduled refresh failed");
                            }
                        }
                    }
                }
            }
        });

        Ok(PeriodicRefresh {
            cancel,
            handle: Some(handle),
        })
    }
}

impl<P: SampleProvider> Inner<P> {
    async fn fetch(&self) -> std::result::Result<SampleSet, ProviderError> {
        match self.settings.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, self.provider.fetch_samples())
                .await
                .map_err(|_| ProviderError::Timeout(limit.as_millis() as u64))?,
            None => self.provider.fetch_samples().await,
        }
    }

    fn build_snapshot(&self, samples: SampleSet) -> Result<SystemSnapshot> {
        for (&key, sample) in &samples {
            if key != sample.kind {
                return Err(ProviderError::Mislabeled {
                    key,
                    kind: sample.kind,
                }
                .into());
            }
            if !sample.value.is_finite() {
                return Err(MonitorError::InvalidSample {
                    kind: key,
                    value: sample.value,
                });
            }
        }

        let mut per_metric_severity = BTreeMap::new();
        for &kind in &self.settings.tracked {
            let sample = samples.get(&kind).ok_or(ProviderError::Incomplete(kind))?;
            per_metric_severity.insert(kind, self.bands.classify(kind, sample.value)?);
        }
        let overall_severity = status::aggregate(&per_metric_severity)?;

        Ok(SystemSnapshot {
            samples,
            per_metric_severity,
            overall_severity,
            last_updated: Utc::now(),
            is_refreshing: false,
        })
    }
}

/// Handle to the periodic refresh task. Dropping it stops the task.
pub struct PeriodicRefresh {
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicRefresh {
    /// Stops future automatic refreshes. Safe to call more than once; an
    /// in-flight refresh still runs to completion.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancels and waits for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "periodic refresh task ended abnormally");
            }
        }
    }
}

impl Drop for PeriodicRefresh {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MetricSample, Severity};
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<Notification>>);

    impl NotificationSink for RecordingSink {
        fn notify(&self, notification: Notification) {
            self.0.lock().push(notification);
        }
    }

    struct ScriptedProvider {
        delay: Duration,
        calls: AtomicUsize,
        script: Mutex<VecDeque<std::result::Result<SampleSet, ProviderError>>>,
    }

    impl ScriptedProvider {
        fn new(delay: Duration) -> Self {
            Self {
                delay,
                calls: AtomicUsize::new(0),
                script: Mutex::new(VecDeque::new()),
            }
        }

        fn then(self, response: std::result::Result<SampleSet, ProviderError>) -> Self {
            self.script.lock().push_back(response);
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl SampleProvider for ScriptedProvider {
        async fn fetch_samples(&self) -> std::result::Result<SampleSet, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().pop_front();
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            next.unwrap_or_else(|| Ok(readings(24.0, 50.0, 20.0)))
        }
    }

    fn readings(temperature: f64, humidity: f64, air_quality: f64) -> SampleSet {
        [
            MetricSample::new(MetricKind::Temperature, temperature),
            MetricSample::new(MetricKind::Humidity, humidity),
            MetricSample::new(MetricKind::AirQuality, air_quality),
        ]
        .into_iter()
        .map(|s| (s.kind, s))
        .collect()
    }

    fn scheduler(provider: ScriptedProvider) -> (RefreshScheduler<ScriptedProvider>, Arc<RecordingSink>) {
        scheduler_with(provider, RefreshSettings::default())
    }

    fn scheduler_with(
        provider: ScriptedProvider,
        settings: RefreshSettings,
    ) -> (RefreshScheduler<ScriptedProvider>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let scheduler =
            RefreshScheduler::new(provider, BandTable::default(), settings, sink.clone()).unwrap();
        (scheduler, sink)
    }

    #[tokio::test]
    async fn classifies_reference_example() {
        let provider = ScriptedProvider::new(Duration::ZERO).then(Ok(readings(27.0, 55.0, 80.0)));
        let (scheduler, _) = scheduler(provider);

        let outcome = scheduler.refresh_now().await.unwrap();
        let snapshot = outcome.snapshot().unwrap();
        assert_eq!(snapshot.severity_of(MetricKind::Temperature), Some(Severity::Warning));
        assert_eq!(snapshot.severity_of(MetricKind::Humidity), Some(Severity::Optimal));
        assert_eq!(snapshot.severity_of(MetricKind::AirQuality), Some(Severity::Critical));
        assert_eq!(snapshot.overall_severity, Severity::Critical);
        assert!(!snapshot.is_refreshing);
        assert!(Arc::ptr_eq(snapshot, &scheduler.snapshot().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_requests_coalesce() {
        let provider = ScriptedProvider::new(Duration::from_millis(800));
        let (scheduler, _) = scheduler(provider);
        let mut rx = scheduler.subscribe();

        let (a, b) = tokio::join!(scheduler.refresh_now(), scheduler.refresh_now());
        let published = [a.unwrap(), b.unwrap()]
            .iter()
            .filter(|o| matches!(o, RefreshOutcome::Published(_)))
            .count();

        assert_eq!(published, 1);
        assert_eq!(scheduler.provider().calls(), 1);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        assert!(!rx.has_changed().unwrap());
        assert!(!scheduler.is_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn reports_in_flight_state() {
        let provider = ScriptedProvider::new(Duration::from_secs(1));
        let (scheduler, _) = scheduler(provider);

        let background = scheduler.clone();
        let task = tokio::spawn(async move { background.refresh_now().await });
        tokio::task::yield_now().await;
        assert!(scheduler.is_refreshing());
        assert!(matches!(
            scheduler.refresh_now().await.unwrap(),
            RefreshOutcome::Coalesced
        ));

        task.await.unwrap().unwrap();
        assert!(!scheduler.is_refreshing());
    }

    #[tokio::test]
    async fn failure_keeps_previous_snapshot() {
        let provider = ScriptedProvider::new(Duration::ZERO)
            .then(Ok(readings(24.0, 50.0, 10.0)))
            .then(Err(ProviderError::Unavailable("link down".into())));
        let (scheduler, sink) = scheduler(provider);

        scheduler.refresh_now().await.unwrap();
        let before = scheduler.snapshot().unwrap();

        let err = scheduler.refresh_now().await.unwrap_err();
        assert!(err.is_recoverable());
        let after = scheduler.snapshot().unwrap();
        assert!(Arc::ptr_eq(&before, &after));
        assert_eq!(after.last_updated, before.last_updated);
        assert!(scheduler.is_stale());
        assert!(!scheduler.is_refreshing());

        let notes = sink.0.lock();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].title, "Sensor refresh failed");

        drop(notes);
        scheduler.refresh_now().await.unwrap();
        assert!(!scheduler.is_stale());
    }

    #[tokio::test]
    async fn missing_tracked_metric_is_a_provider_failure() {
        let mut partial = readings(24.0, 50.0, 10.0);
        partial.remove(&MetricKind::Humidity);
        let provider = ScriptedProvider::new(Duration::ZERO).then(Ok(partial));
        let (scheduler, _) = scheduler(provider);

        let err = scheduler.refresh_now().await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::ProviderFailure(ProviderError::Incomplete(MetricKind::Humidity))
        ));
        assert!(scheduler.snapshot().is_none());
    }

    #[tokio::test]
    async fn nan_sample_is_rejected_without_publishing() {
        let provider = ScriptedProvider::new(Duration::ZERO)
            .then(Ok(readings(24.0, 50.0, 10.0)))
            .then(Ok(readings(f64::NAN, 50.0, 10.0)));
        let (scheduler, _) = scheduler(provider);

        scheduler.refresh_now().await.unwrap();
        let before = scheduler.snapshot().unwrap();
        let err = scheduler.refresh_now().await.unwrap_err();
        assert!(matches!(err, MonitorError::InvalidSample { .. }));
        assert!(Arc::ptr_eq(&before, &scheduler.snapshot().unwrap()));
    }

    #[tokio::test]
    async fn non_finite_untracked_sample_is_rejected() {
        let mut samples = readings(24.0, 50.0, 10.0);
        samples.insert(
            MetricKind::Pressure,
            MetricSample::new(MetricKind::Pressure, f64::NAN),
        );
        let provider = ScriptedProvider::new(Duration::ZERO)
            .then(Ok(readings(24.0, 50.0, 10.0)))
            .then(Ok(samples));
        let (scheduler, _) = scheduler(provider);

        scheduler.refresh_now().await.unwrap();
        let before = scheduler.snapshot().unwrap();
        let err = scheduler.refresh_now().await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::InvalidSample {
                kind: MetricKind::Pressure,
                ..
            }
        ));
        assert!(Arc::ptr_eq(&before, &scheduler.snapshot().unwrap()));
        assert!(scheduler.is_stale());
    }

    #[tokio::test]
    async fn sample_filed_under_wrong_metric_is_rejected() {
        let mut samples = readings(24.0, 50.0, 10.0);
        samples.insert(
            MetricKind::Noise,
            MetricSample::new(MetricKind::Temperature, 23.0),
        );
        let provider = ScriptedProvider::new(Duration::ZERO).then(Ok(samples));
        let (scheduler, _) = scheduler(provider);

        let err = scheduler.refresh_now().await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::ProviderFailure(ProviderError::Mislabeled {
                key: MetricKind::Noise,
                kind: MetricKind::Temperature,
            })
        ));
        assert!(scheduler.snapshot().is_none());
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let (scheduler, _) = scheduler(ScriptedProvider::new(Duration::ZERO));
        assert!(matches!(
            scheduler.spawn_periodic(Duration::ZERO),
            Err(MonitorError::Config(_))
        ));
        assert_eq!(scheduler.provider().calls(), 0);
    }

    #[tokio::test]
    async fn untracked_samples_are_carried_unclassified() {
        let mut samples = readings(24.0, 50.0, 10.0);
        samples.insert(MetricKind::Noise, MetricSample::new(MetricKind::Noise, 64.0));
        let provider = ScriptedProvider::new(Duration::ZERO).then(Ok(samples));
        let (scheduler, _) = scheduler(provider);

        let outcome = scheduler.refresh_now().await.unwrap();
        let snapshot = outcome.snapshot().unwrap();
        assert_eq!(snapshot.samples[&MetricKind::Noise].value, 64.0);
        assert_eq!(snapshot.severity_of(MetricKind::Noise), None);
        assert_eq!(snapshot.overall_severity, Severity::Optimal);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let provider = ScriptedProvider::new(Duration::from_secs(5));
        let settings = RefreshSettings {
            fetch_timeout: Some(Duration::from_secs(1)),
            ..RefreshSettings::default()
        };
        let (scheduler, _) = scheduler_with(provider, settings);

        let err = scheduler.refresh_now().await.unwrap_err();
        assert!(matches!(
            err,
            MonitorError::ProviderFailure(ProviderError::Timeout(1000))
        ));
        assert!(!scheduler.is_refreshing());
    }

    #[test]
    fn construction_validates_tracked_metrics() {
        let sink: Arc<dyn NotificationSink> = Arc::new(RecordingSink::default());
        let no_noise_band = RefreshSettings {
            tracked: vec![MetricKind::Temperature, MetricKind::Noise],
            fetch_timeout: None,
        };
        assert!(matches!(
            RefreshScheduler::new(
                ScriptedProvider::new(Duration::ZERO),
                BandTable::default(),
                no_noise_band,
                sink.clone(),
            ),
            Err(MonitorError::Config(_))
        ));

        let nothing = RefreshSettings {
            tracked: Vec::new(),
            fetch_timeout: None,
        };
        assert!(RefreshScheduler::new(
            ScriptedProvider::new(Duration::ZERO),
            BandTable::default(),
            nothing,
            sink,
        )
        .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_refresh_runs_until_cancelled() {
        let (scheduler, _) = scheduler(ScriptedProvider::new(Duration::ZERO));

        let periodic = scheduler.spawn_periodic(DEFAULT_REFRESH_INTERVAL).unwrap();
        tokio::time::sleep(Duration::from_secs(150)).await;
        assert_eq!(scheduler.provider().calls(), 3);

        periodic.cancel();
        periodic.cancel();
        assert!(periodic.is_cancelled());
        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(scheduler.provider().calls(), 3);

        scheduler.refresh_now().await.unwrap();
        assert_eq!(scheduler.provider().calls(), 4);
        periodic.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_failure_does_not_stop_schedule() {
        let provider = ScriptedProvider::new(Duration::ZERO)
            .then(Err(ProviderError::Unavailable("boot".into())));
        let (scheduler, sink) = scheduler(provider);

        let periodic = scheduler.spawn_periodic(Duration::from_secs(60)).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(scheduler.snapshot().is_none());
        assert!(scheduler.is_stale());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(scheduler.provider().calls(), 2);
        assert!(scheduler.snapshot().is_some());
        assert!(!scheduler.is_stale());
        assert_eq!(sink.0.lock().len(), 1);
        periodic.shutdown().await;
    }
}
