use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{MonitorError, Result};
use crate::types::{MetricKind, Severity};

/// Inclusive `[lo, hi]` range.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct Range {
    pub lo: f64,
    pub hi: f64,
}

impl Range {
    pub const fn new(lo: f64, hi: f64) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.lo <= value && value <= self.hi
    }

    fn encloses(&self, other: &Range) -> bool {
        self.lo <= other.lo && other.hi <= self.hi
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ThresholdBand {
    pub optimal: Range,
    pub warning: Range,
}

impl ThresholdBand {
    pub const fn new(optimal: (f64, f64), warning: (f64, f64)) -> Self {
        Self {
            optimal: Range::new(optimal.0, optimal.1),
            warning: Range::new(warning.0, warning.1),
        }
    }

    /// Rejects bands the classifier cannot evaluate consistently.
    pub fn validate(&self) -> Result<()> {
        let finite = [self.optimal.lo, self.optimal.hi, self.warning.lo, self.warning.hi]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(MonitorError::Config("band bounds must be finite".into()));
        }
        if self.optimal.lo > self.optimal.hi || self.warning.lo > self.warning.hi {
            return Err(MonitorError::Config("band range has lo > hi".into()));
        }
        if !self.warning.encloses(&self.optimal) {
            return Err(MonitorError::Config(
                "optimal range must lie inside the warning range".into(),
            ));
        }
        Ok(())
    }

    pub fn optimal_label(&self, kind: MetricKind) -> String {
        format!(
            "Optimal range: {}-{}{}",
            self.optimal.lo,
            self.optimal.hi,
            kind.unit().trim()
        )
    }
}

/// Classifies one reading against its band.
///
/// Boundary values belong to the less severe range, so a reading equal to
/// `optimal.hi` is Optimal even when it also equals `warning.lo`.
pub fn classify(kind: MetricKind, value: f64, band: &ThresholdBand) -> Result<Severity> {
    if !value.is_finite() {
        return Err(MonitorError::InvalidSample { kind, value });
    }
    if band.optimal.contains(value) {
        Ok(Severity::Optimal)
    } else if band.warning.contains(value) {
        Ok(Severity::Warning)
    } else {
        Ok(Severity::Critical)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BandTable {
    bands: BTreeMap<MetricKind, ThresholdBand>,
}

impl Default for BandTable {
    fn default() -> Self {
        let mut bands = BTreeMap::new();
        bands.insert(
            MetricKind::Temperature,
            ThresholdBand::new((22.0, 26.0), (18.0, 30.0)),
        );
        bands.insert(
            MetricKind::Humidity,
            ThresholdBand::new((40.0, 60.0), (30.0, 70.0)),
        );
        bands.insert(
            MetricKind::AirQuality,
            ThresholdBand::new((0.0, 50.0), (50.0, 75.0)),
        );
        Self { bands }
    }
}

impl BandTable {
    pub fn empty() -> Self {
        Self {
            bands: BTreeMap::new(),
        }
    }

    pub fn get(&self, kind: MetricKind) -> Result<&ThresholdBand> {
        self.bands
            .get(&kind)
            .ok_or_else(|| MonitorError::Config(format!("no threshold band configured for {}", kind)))
    }

    pub fn contains(&self, kind: MetricKind) -> bool {
        self.bands.contains_key(&kind)
    }

    pub fn set(&mut self, kind: MetricKind, band: ThresholdBand) -> Result<()> {
        band.validate()?;
        self.bands.insert(kind, band);
        Ok(())
    }

    pub fn classify(&self, kind: MetricKind, value: f64) -> Result<Severity> {
        classify(kind, value, self.get(kind)?)
    }
}
