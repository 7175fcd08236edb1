use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 16;

/// Payload-free "unread changed" signal from the poller to any mounted bell.
#[derive(Debug, Clone)]
pub struct NotificationSignal {
    sender: broadcast::Sender<()>,
}

impl NotificationSignal {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    /// Notify all subscribers. No-op if nobody listens.
    pub fn bump(&self) {
        // Ignore send errors (no active receivers)
        let _ = self.sender.send(());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationSignal {
    fn default() -> Self {
        Self::new()
    }
}
