//! Automation control channels.
//!
//! Each channel has an enable flag and, except for power, one integral
//! parameter. The stored parameter survives a disable so re-enabling restores
//! the last setting. Every mutation returns the [`Notification`] describing it;
//! [`SharedControls`] forwards those to a sink and serializes writers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{MonitorError, Result};
use crate::notify::{Notification, NotificationSink};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Ventilation,
    Lighting,
    Security,
    Power,
}

impl Channel {
    pub const ALL: [Channel; 4] = [
        Channel::Ventilation,
        Channel::Lighting,
        Channel::Security,
        Channel::Power,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Ventilation => "ventilation",
            Channel::Lighting => "lighting",
            Channel::Security => "security",
            Channel::Power => "power",
        }
    }

    /// Valid parameter values; `None` for power, which only has a mode.
    pub fn range(&self) -> Option<ParameterRange> {
        match self {
            Channel::Ventilation => Some(ParameterRange::new(0, 100, 5)),
            Channel::Lighting => Some(ParameterRange::new(5, 100, 5)),
            Channel::Security => Some(ParameterRange::new(1, 3, 1)),
            Channel::Power => None,
        }
    }

    pub fn factory_default(&self) -> ChannelState {
        match self {
            Channel::Ventilation => ChannelState::new(false, Some(50)),
            Channel::Lighting => ChannelState::new(true, Some(80)),
            Channel::Security => ChannelState::new(true, Some(2)),
            Channel::Power => ChannelState::new(false, None),
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = MonitorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ventilation" => Ok(Channel::Ventilation),
            "lighting" => Ok(Channel::Lighting),
            "security" => Ok(Channel::Security),
            "power" => Ok(Channel::Power),
            other => Err(MonitorError::Config(format!("unknown channel '{}'", other))),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterRange {
    pub min: u8,
    pub max: u8,
    pub step: u8,
}

impl ParameterRange {
    pub const fn new(min: u8, max: u8, step: u8) -> Self {
        Self { min, max, step }
    }

    /// Accepts only values a slider for this range could produce.
    pub fn validate(&self, value: i64) -> Result<u8> {
        let (min, max, step) = (i64::from(self.min), i64::from(self.max), i64::from(self.step));
        if value < min || value > max {
            return Err(MonitorError::Config(format!(
                "parameter {} outside {}..={}",
                value, self.min, self.max
            )));
        }
        if (value - min) % step != 0 {
            return Err(MonitorError::Config(format!(
                "parameter {} is not a multiple of step {} from {}",
                value, self.step, self.min
            )));
        }
        Ok(value as u8)
    }

    /// Nearest valid value, the way a slider snaps input.
    pub fn snap(&self, value: i64) -> u8 {
        let (min, max, step) = (i64::from(self.min), i64::from(self.max), i64::from(self.step));
        let clamped = value.clamp(min, max);
        let steps = (clamped - min + step / 2) / step;
        (min + steps * step).min(max) as u8
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelState {
    pub enabled: bool,
    pub parameter: Option<u8>,
}

impl ChannelState {
    const fn new(enabled: bool, parameter: Option<u8>) -> Self {
        Self { enabled, parameter }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ControlStateModel {
    states: [ChannelState; 4],
}

impl Default for ControlStateModel {
    fn default() -> Self {
        Self {
            states: Channel::ALL.map(|channel| channel.factory_default()),
        }
    }
}

impl ControlStateModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, channel: Channel) -> ChannelState {
        self.states[channel.index()]
    }

    pub fn is_enabled(&self, channel: Channel) -> bool {
        self.state(channel).enabled
    }

    /// Stored parameter, kept even while the channel is disabled.
    pub fn parameter(&self, channel: Channel) -> Option<u8> {
        self.state(channel).parameter
    }

    /// Parameter currently in effect; `None` while disabled.
    pub fn active_parameter(&self, channel: Channel) -> Option<u8> {
        let state = self.state(channel);
        state.enabled.then_some(state.parameter).flatten()
    }

    pub fn set_enabled(&mut self, channel: Channel, enabled: bool) -> Notification {
        let state = &mut self.states[channel.index()];
        state.enabled = enabled;
        let value = state.parameter.unwrap_or_default();
        tracing::debug!(%channel, enabled, "channel toggled");

        let verb = if enabled { "activated" } else { "deactivated" };
        match (channel, enabled) {
            (Channel::Ventilation, true) => Notification::info(
                format!("Ventilation system {}", verb),
                format!("System running at {}% capacity", value),
            ),
            (Channel::Ventilation, false) => Notification::info(
                format!("Ventilation system {}", verb),
                "System now in standby mode",
            ),
            (Channel::Lighting, true) => Notification::info(
                format!("Lighting system {}", verb),
                format!("Brightness set to {}%", value),
            ),
            (Channel::Lighting, false) => {
                Notification::info(format!("Lighting system {}", verb), "Lights turned off")
            }
            (Channel::Security, true) => Notification::info(
                format!("Security system {}", verb),
                format!("Set to level {}", value),
            ),
            (Channel::Security, false) => Notification::destructive(
                format!("Security system {}", verb),
                "Security features disabled",
            ),
            (Channel::Power, true) => Notification::info(
                "Power saving mode enabled",
                "Systems will operate at reduced capacity",
            ),
            (Channel::Power, false) => Notification::info(
                "Power saving mode disabled",
                "Systems operating at normal capacity",
            ),
        }
    }

    /// Stores `value` for the channel. An "adjusted" notification is produced
    /// only while the channel is enabled.
    pub fn set_parameter(&mut self, channel: Channel, value: u8) -> Result<Option<Notification>> {
        let (title, description) = match channel {
            Channel::Ventilation => (
                "Ventilation speed adjusted",
                format!("Now running at {}% capacity", value),
            ),
            Channel::Lighting => (
                "Lighting brightness adjusted",
                format!("Set to {}% intensity", value),
            ),
            Channel::Security => ("Security level adjusted", format!("Now at level {}", value)),
            Channel::Power => {
                return Err(MonitorError::Config(format!(
                    "channel {} has no parameter",
                    channel
                )))
            }
        };
        let state = &mut self.states[channel.index()];
        state.parameter = Some(value);
        tracing::debug!(%channel, value, enabled = state.enabled, "channel parameter stored");
        Ok(state.enabled.then(|| Notification::info(title, description)))
    }

    pub fn reset(&mut self) -> Notification {
        *self = Self::default();
        tracing::debug!("controls reset to factory defaults");
        Notification::info(
            "Systems reset to default",
            "All automation controls have been restored to factory settings",
        )
    }

    pub fn status_label(&self, channel: Channel) -> &'static str {
        match (channel, self.is_enabled(channel)) {
            (Channel::Ventilation, true) => "Active",
            (Channel::Ventilation, false) => "Standby",
            (Channel::Lighting, true) => "On",
            (Channel::Lighting, false) => "Off",
            (Channel::Security, true) => "Enabled",
            (Channel::Security, false) => "Disabled",
            (Channel::Power, true) => "Eco Mode",
            (Channel::Power, false) => "Normal Mode",
        }
    }

    pub fn parameter_label(&self, channel: Channel) -> Option<String> {
        let value = self.parameter(channel)?;
        match channel {
            Channel::Ventilation => Some(format!("{}% Speed", value)),
            Channel::Lighting => Some(format!("{}% Brightness", value)),
            Channel::Security => Some(format!("Level {}", value)),
            Channel::Power => None,
        }
    }

    pub fn summary(&self, channel: Channel) -> String {
        match (channel, self.active_parameter(channel)) {
            (Channel::Ventilation, Some(v)) => format!("Circulating air at {}% capacity", v),
            (Channel::Ventilation, None) => "System currently in standby mode".to_string(),
            (Channel::Lighting, Some(v)) => format!("Illumination set to {}% intensity", v),
            (Channel::Lighting, None) => "Lighting system currently turned off".to_string(),
            (Channel::Security, Some(v)) => format!("Security protocols active at level {}", v),
            (Channel::Security, None) => "Security measures currently disabled".to_string(),
            (Channel::Power, _) if self.is_enabled(Channel::Power) => {
                "Systems optimized for efficiency and reduced power consumption".to_string()
            }
            (Channel::Power, _) => "Systems operating at normal power levels".to_string(),
        }
    }
}

pub fn security_level_name(level: u8) -> Option<&'static str> {
    match level {
        1 => Some("Basic"),
        2 => Some("Standard"),
        3 => Some("Maximum"),
        _ => None,
    }
}

/// One request from the event-handling boundary, already validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    SetEnabled(Channel, bool),
    SetParameter(Channel, u8),
    Reset,
}

impl ControlCommand {
    pub fn toggle(channel: &str, enabled: bool) -> Result<Self> {
        Ok(ControlCommand::SetEnabled(channel.parse()?, enabled))
    }

    pub fn parameter(channel: &str, value: i64) -> Result<Self> {
        let channel: Channel = channel.parse()?;
        let range = channel
            .range()
            .ok_or_else(|| MonitorError::Config(format!("channel {} has no parameter", channel)))?;
        Ok(ControlCommand::SetParameter(channel, range.validate(value)?))
    }

    pub fn apply(self, model: &mut ControlStateModel) -> Result<Option<Notification>> {
        match self {
            ControlCommand::SetEnabled(channel, enabled) => {
                Ok(Some(model.set_enabled(channel, enabled)))
            }
            ControlCommand::SetParameter(channel, value) => model.set_parameter(channel, value),
            ControlCommand::Reset => Ok(Some(model.reset())),
        }
    }
}

/// Clonable handle that serializes writers and forwards notifications.
#[derive(Clone)]
pub struct SharedControls {
    model: Arc<Mutex<ControlStateModel>>,
    sink: Arc<dyn NotificationSink>,
}

impl SharedControls {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            model: Arc::new(Mutex::new(ControlStateModel::default())),
            sink,
        }
    }

    pub fn execute(&self, command: ControlCommand) -> Result<Option<Notification>> {
        let notification = {
            let mut model = self.model.lock();
            command.apply(&mut model)?
        };
        if let Some(notification) = &notification {
            self.sink.notify(notification.clone());
        }
        Ok(notification)
    }

    pub fn set_enabled(&self, channel: Channel, enabled: bool) -> Notification {
        let notification = self.model.lock().set_enabled(channel, enabled);
        self.sink.notify(notification.clone());
        notification
    }

    pub fn set_parameter(&self, channel: Channel, value: u8) -> Result<Option<Notification>> {
        self.execute(ControlCommand::SetParameter(channel, value))
    }

    pub fn reset(&self) -> Notification {
        let notification = self.model.lock().reset();
        self.sink.notify(notification.clone());
        notification
    }

    /// Copy of the current state, detached from later writes.
    pub fn snapshot(&self) -> ControlStateModel {
        self.model.lock().clone()
    }
}
