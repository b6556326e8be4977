//! Delivery seam between the scheduler and whatever transport carries messages.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

/// A rendered reminder ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Reminder id, or the fire-guard signature for anchored events.
    pub reminder_id: String,
    /// Opaque channel handle.
    pub destination: String,
    pub text: String,
    /// Ask the transport to mention everyone in the destination.
    pub broadcast_mention: bool,
}

/// Delivery contract. Transports only need to implement this trait.
///
/// Retries, if any, belong to the implementation; the scheduler records a
/// failed attempt and moves on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()>;
}

/// Forwards notifications into an mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self { tx }
    }

    /// Notifier plus the receiving end, with room for `capacity` pending items.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        self.tx
            .send(notification)
            .await
            .map_err(|_| anyhow::anyhow!("notification receiver dropped"))
    }
}

/// Writes each notification to the log. Used by the stock binary.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: Notification) -> anyhow::Result<()> {
        info!(
            reminder_id = %notification.reminder_id,
            destination = %notification.destination,
            broadcast = notification.broadcast_mention,
            "reminder: {}",
            notification.text
        );
        Ok(())
    }
}
