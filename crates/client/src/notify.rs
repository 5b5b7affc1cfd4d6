//! User-facing notices.
//!
//! Repositories publish a [`Notice`] after every write, successful or not.
//! Whatever renders the UI subscribes and shows them however it likes; with
//! no subscriber the notice is simply dropped.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

/// Capacity of the notice channel. Slow subscribers skip older notices.
const CHANNEL_CAPACITY: usize = 64;

/// Severity of a notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// A write completed.
    Success,
    /// Neutral information, e.g. "already in cart".
    Info,
    /// A write failed.
    Error,
}

/// A transient message for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    /// Severity.
    pub level: NoticeLevel,
    /// Short heading.
    pub title: String,
    /// Body text.
    pub message: String,
}

impl Notice {
    /// Success notice.
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: title.into(),
            message: message.into(),
        }
    }

    /// Informational notice.
    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            title: title.into(),
            message: message.into(),
        }
    }

    /// Error notice.
    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

/// Broadcast hub for notices. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notice>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    /// Create a notifier with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Receive every notice published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.sender.subscribe()
    }

    /// Publish a notice.
    pub fn publish(&self, notice: Notice) {
        trace!(level = ?notice.level, title = %notice.title, "Publishing notice");
        // No subscribers is fine.
        let _ = self.sender.send(notice);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_receive_published_notices() {
        let notifier = Notifier::new();
        let mut rx = notifier.subscribe();

        notifier.publish(Notice::success("Saved", "Recipe added"));
        notifier.clone().publish(Notice::error("Failed", "Try again"));

        assert_eq!(rx.recv().await.unwrap().level, NoticeLevel::Success);
        let second = rx.recv().await.unwrap();
        assert_eq!(second.title, "Failed");
        assert_eq!(second.level, NoticeLevel::Error);
    }

    #[test]
    fn test_publish_without_subscribers() {
        Notifier::new().publish(Notice::info("Nobody", "listening"));
    }
}
