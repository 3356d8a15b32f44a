use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Destructive,
}

/// Human-readable event for whatever surface shows toasts or logs.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub level: NotificationLevel,
    pub emitted_at: DateTime<Utc>,
}

impl Notification {
    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            level: NotificationLevel::Info,
            emitted_at: Utc::now(),
        }
    }

    pub fn destructive(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Destructive,
            ..Self::info(title, description)
        }
    }
}

/// Receives informational events; no acknowledgment is expected.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes every notification to the tracing log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Info => tracing::info!(
                title = %notification.title,
                description = %notification.description,
                "notification"
            ),
            NotificationLevel::Destructive => tracing::warn!(
                title = %notification.title,
                description = %notification.description,
                "notification"
            ),
        }
    }
}

/// Forwards notifications into a channel drained by a UI layer.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        if self.tx.send(notification).is_err() {
            tracing::debug!("notification receiver dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_sink_forwards_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        sink.notify(Notification::info("first", "a"));
        sink.notify(Notification::destructive("second", "b"));

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.title, "first");
        assert_eq!(first.level, NotificationLevel::Info);
        assert_eq!(second.level, NotificationLevel::Destructive);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn channel_sink_tolerates_closed_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.notify(Notification::info("ignored", ""));
    }
}
