pub mod config;
pub mod controls;
pub mod dashboard;
pub mod error;
pub mod notify;
pub mod provider;
pub mod scheduler;
pub mod session;
pub mod simulate;
pub mod status;
pub mod thresholds;
pub mod types;

pub use controls::{Channel, ControlCommand, ControlStateModel, SharedControls};
pub use dashboard::Dashboard;
pub use error::{MonitorError, ProviderError};
pub use notify::{Notification, NotificationSink};
pub use provider::SampleProvider;
pub use scheduler::{PeriodicRefresh, RefreshOutcome, RefreshScheduler, RefreshSettings};
pub use session::SessionContext;
pub use types::{MetricKind, MetricSample, SampleSet, Severity, SystemSnapshot};
