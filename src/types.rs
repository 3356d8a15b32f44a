use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::MonitorError;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Temperature,
    Humidity,
    AirQuality,
    Pressure,
    Noise,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Temperature,
        MetricKind::Humidity,
        MetricKind::AirQuality,
        MetricKind::Pressure,
        MetricKind::Noise,
    ];

    /// Metrics that feed the overall system status in the reference deployment.
    pub const TRACKED: [MetricKind; 3] = [
        MetricKind::Temperature,
        MetricKind::Humidity,
        MetricKind::AirQuality,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Temperature => "temperature",
            MetricKind::Humidity => "humidity",
            MetricKind::AirQuality => "air_quality",
            MetricKind::Pressure => "pressure",
            MetricKind::Noise => "noise",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            MetricKind::Temperature => "Temperature",
            MetricKind::Humidity => "Humidity",
            MetricKind::AirQuality => "Air Quality",
            MetricKind::Pressure => "Pressure",
            MetricKind::Noise => "Noise",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            MetricKind::Temperature => "°C",
            MetricKind::Humidity => "%",
            MetricKind::AirQuality => "",
            MetricKind::Pressure => " hPa",
            MetricKind::Noise => " dB",
        }
    }

    /// Lower and upper ends of the gauge drawn next to a reading.
    pub fn gauge_span(&self) -> (f64, f64) {
        match self {
            MetricKind::Temperature => (15.0, 35.0),
            MetricKind::Humidity => (30.0, 70.0),
            MetricKind::AirQuality => (0.0, 100.0),
            MetricKind::Pressure => (990.0, 1000.0),
            MetricKind::Noise => (50.0, 80.0),
        }
    }

    /// Position of `value` on the gauge, clamped to 0..=100.
    pub fn gauge_percent(&self, value: f64) -> f64 {
        let (lo, hi) = self.gauge_span();
        ((value - lo) / (hi - lo) * 100.0).clamp(0.0, 100.0)
    }

    /// Reading rendered the way the dashboard cards show it.
    pub fn format_value(&self, value: f64) -> String {
        match self {
            MetricKind::AirQuality => format!("{:.0}", value),
            _ => format!("{:.1}{}", value, self.unit()),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "temperature" => Ok(MetricKind::Temperature),
            "humidity" => Ok(MetricKind::Humidity),
            "air_quality" | "airquality" => Ok(MetricKind::AirQuality),
            "pressure" => Ok(MetricKind::Pressure),
            "noise" => Ok(MetricKind::Noise),
            other => Err(MonitorError::Config(format!("unknown metric kind '{}'", other))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct MetricSample {
    pub kind: MetricKind,
    pub value: f64,
    pub observed_at: DateTime<Utc>,
}

impl MetricSample {
    pub fn new(kind: MetricKind, value: f64) -> Self {
        Self {
            kind,
            value,
            observed_at: Utc::now(),
        }
    }
}

/// One provider result, keyed by metric.
pub type SampleSet = BTreeMap<MetricKind, MetricSample>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Optimal,
    Warning,
    Critical,
}

impl Severity {
    pub fn label(&self) -> &'static str {
        match self {
            Severity::Optimal => "Optimal",
            Severity::Warning => "Warning",
            Severity::Critical => "Critical",
        }
    }

    /// Sentence shown next to the overall system status.
    pub fn summary(&self) -> &'static str {
        match self {
            Severity::Optimal => "All systems within optimal parameters",
            Severity::Warning => "Some parameters require attention",
            Severity::Critical => "Critical issues detected - action required",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Immutable, fully classified view of one refresh.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SystemSnapshot {
    pub samples: SampleSet,
    pub per_metric_severity: BTreeMap<MetricKind, Severity>,
    pub overall_severity: Severity,
    pub last_updated: DateTime<Utc>,
    pub is_refreshing: bool,
}

impl SystemSnapshot {
    pub fn severity_of(&self, kind: MetricKind) -> Option<Severity> {
        self.per_metric_severity.get(&kind).copied()
    }

    /// Completion time in the operator's local time zone.
    pub fn last_updated_label(&self) -> String {
        self.last_updated
            .with_timezone(&Local)
            .format("%H:%M:%S")
            .to_string()
    }

    pub fn status_line(&self) -> String {
        format!(
            "System Status: {} ({})",
            self.overall_severity,
            self.overall_severity.summary()
        )
    }
}
