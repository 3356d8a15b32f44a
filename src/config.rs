use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::scheduler::RefreshSettings;
use crate::thresholds::{BandTable, ThresholdBand};
use crate::types::MetricKind;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub facility_id: String,
    pub operator_name: Option<String>,
    pub refresh_interval_secs: u64,
    pub fetch_timeout_ms: Option<u64>,
    pub simulated_latency_ms: u64,
    pub simulated_failure_rate: f64,
    pub json_logs: bool,
}

/// Optional `monitor_config.json`; band keys are metric names.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct FileOverrides {
    #[serde(default)]
    pub bands: BTreeMap<String, ThresholdBand>,
    #[serde(default)]
    pub tracked: Option<Vec<String>>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let facility_id = env::var("FACILITY_ID").unwrap_or_else(|_| Uuid::new_v4().to_string());
        let operator_name = env::var("OPERATOR_NAME")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let refresh_interval_secs = get_env_var_u64("REFRESH_INTERVAL_SECS", 60).max(1);
        let fetch_timeout_ms = env::var("FETCH_TIMEOUT_MS").ok().and_then(|v| v.parse().ok());
        let simulated_latency_ms = get_env_var_u64("SIMULATED_LATENCY_MS", 800);
        let simulated_failure_rate = env::var("SIMULATED_FAILURE_RATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.0);
        let json_logs = env::var("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        Ok(Config {
            facility_id,
            operator_name,
            refresh_interval_secs,
            fetch_timeout_ms,
            simulated_latency_ms,
            simulated_failure_rate,
            json_logs,
        })
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn config_file_path() -> PathBuf {
        let config_dir = env::var("CONFIG_DIR").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(config_dir).join("monitor_config.json")
    }

    /// Reads overrides if the file exists; a missing file means defaults.
    pub fn load_overrides(path: &Path) -> Result<FileOverrides> {
        if !path.exists() {
            return Ok(FileOverrides::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let overrides: FileOverrides = serde_json::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(overrides)
    }

    pub fn refresh_settings(&self, overrides: &FileOverrides) -> Result<RefreshSettings> {
        let mut settings = RefreshSettings {
            fetch_timeout: self.fetch_timeout_ms.map(Duration::from_millis),
            ..RefreshSettings::default()
        };
        if let Some(tracked) = &overrides.tracked {
            settings.tracked = tracked
                .iter()
                .map(|name| name.parse::<MetricKind>())
                .collect::<std::result::Result<_, _>>()?;
        }
        Ok(settings)
    }
}

impl FileOverrides {
    pub fn band_table(&self) -> Result<BandTable> {
        let mut table = BandTable::default();
        for (name, band) in &self.bands {
            let kind: MetricKind = name.parse()?;
            table
                .set(kind, *band)
                .with_context(|| format!("threshold band for {}", kind))?;
        }
        Ok(table)
    }
}

fn get_env_var_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or(default)
}
