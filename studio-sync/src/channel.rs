//! In-process transport between the builder and the canvas.

use tokio::sync::mpsc;

use crate::error::{SyncError, SyncResult};
use crate::protocol::SyncMessage;

/// Sending half; cheap to clone.
pub type Outbox = mpsc::UnboundedSender<SyncMessage>;

/// One end of a bidirectional, per-direction FIFO link.
#[derive(Debug)]
pub struct Channel {
    tx: Outbox,
    rx: mpsc::UnboundedReceiver<SyncMessage>,
}

impl Channel {
    /// Create two connected ends.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (Self { tx: a_tx, rx: a_rx }, Self { tx: b_tx, rx: b_rx })
    }

    /// A sender for the other end.
    #[must_use]
    pub fn outbox(&self) -> Outbox {
        self.tx.clone()
    }

    /// Send to the other end.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Disconnected`] if the other end was dropped.
    pub fn send(&self, message: SyncMessage) -> SyncResult<()> {
        self.tx.send(message).map_err(|_| SyncError::Disconnected)
    }

    /// Wait for the next message; `None` once the other end is gone.
    pub async fn recv(&mut self) -> Option<SyncMessage> {
        self.rx.recv().await
    }

    /// Take the next message if one is ready.
    pub fn try_recv(&mut self) -> Option<SyncMessage> {
        self.rx.try_recv().ok()
    }

    /// Split into the sending and receiving halves.
    #[must_use]
    pub fn split(self) -> (Outbox, mpsc::UnboundedReceiver<SyncMessage>) {
        (self.tx, self.rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_is_fifo_per_direction() {
        let (mut a, mut b) = Channel::pair();
        for preview in [true, false] {
            a.send(SyncMessage::PreviewModeChange { preview }).expect("send");
        }
        b.send(SyncMessage::HoverChange { instance_id: None }).expect("send");

        assert_eq!(b.recv().await, Some(SyncMessage::PreviewModeChange { preview: true }));
        assert_eq!(b.recv().await, Some(SyncMessage::PreviewModeChange { preview: false }));
        assert_eq!(a.recv().await, Some(SyncMessage::HoverChange { instance_id: None }));
        assert!(a.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_send_after_drop_fails() {
        let (a, b) = Channel::pair();
        drop(b);
        assert!(matches!(
            a.send(SyncMessage::HoverChange { instance_id: None }),
            Err(SyncError::Disconnected)
        ));
    }
}
