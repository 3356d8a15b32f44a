//! Presentation-boundary composition of the monitoring and control cores.

use serde::Serialize;

use crate::controls::{Channel, SharedControls};
use crate::error::Result;
use crate::provider::SampleProvider;
use crate::scheduler::RefreshScheduler;
use crate::session::SessionContext;
use crate::types::{MetricKind, Severity};

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct MetricCard {
    pub kind: MetricKind,
    pub title: &'static str,
    pub reading: String,
    pub severity: Option<Severity>,
    pub gauge_percent: f64,
    pub optimal_range: Option<String>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct EnvironmentView {
    pub cards: Vec<MetricCard>,
    pub overall: Option<Severity>,
    pub status_message: Option<&'static str>,
    pub last_updated: Option<String>,
    pub refreshing: bool,
    pub stale: bool,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ChannelCard {
    pub channel: Channel,
    pub enabled: bool,
    pub status: &'static str,
    pub parameter: Option<String>,
    pub summary: String,
}

pub struct Dashboard<P> {
    session: SessionContext,
    scheduler: RefreshScheduler<P>,
    controls: SharedControls,
}

impl<P: SampleProvider> Dashboard<P> {
    /// Refuses to open without an active session.
    pub fn open(
        session: SessionContext,
        scheduler: RefreshScheduler<P>,
        controls: SharedControls,
    ) -> Result<Self> {
        session.require_active()?;
        tracing::info!(operator = %session.display_name(), "dashboard opened");
        Ok(Self {
            session,
            scheduler,
            controls,
        })
    }

    pub fn greeting(&self) -> String {
        self.session.greeting()
    }

    pub fn scheduler(&self) -> &RefreshScheduler<P> {
        &self.scheduler
    }

    pub fn controls(&self) -> &SharedControls {
        &self.controls
    }

    pub fn environment(&self) -> EnvironmentView {
        let refreshing = self.scheduler.is_refreshing();
        let stale = self.scheduler.is_stale();
        let Some(snapshot) = self.scheduler.snapshot() else {
            return EnvironmentView {
                cards: Vec::new(),
                overall: None,
                status_message: None,
                last_updated: None,
                refreshing,
                stale,
            };
        };

        let bands = self.scheduler.bands();
        let cards = snapshot
            .samples
            .values()
            .map(|sample| MetricCard {
                kind: sample.kind,
                title: sample.kind.display_name(),
                reading: sample.kind.format_value(sample.value),
                severity: snapshot.severity_of(sample.kind),
                gauge_percent: sample.kind.gauge_percent(sample.value),
                optimal_range: bands
                    .get(sample.kind)
                    .ok()
                    .map(|band| band.optimal_label(sample.kind)),
            })
            .collect();

        EnvironmentView {
            cards,
            overall: Some(snapshot.overall_severity),
            status_message: Some(snapshot.overall_severity.summary()),
            last_updated: Some(snapshot.last_updated_label()),
            refreshing,
            stale,
        }
    }

    pub fn control_panel(&self) -> Vec<ChannelCard> {
        let model = self.controls.snapshot();
        Channel::ALL
            .iter()
            .map(|&channel| ChannelCard {
                channel,
                enabled: model.is_enabled(channel),
                status: model.status_label(channel),
                parameter: model.parameter_label(channel),
                summary: model.summary(channel),
            })
            .collect()
    }
}
