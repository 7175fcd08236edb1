use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::config::ToastConfig;

const CHANNEL_CAPACITY: usize = 64;
const DEFAULT_TITLE: &str = "Notification";

/// A short-lived message shown to the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: Uuid,
    pub title: String,
    pub body: Option<String>,
}

/// Process-wide toast queue.
///
/// Newest toasts sit at the front. Each toast removes itself after the
/// configured TTL; only the first `max_visible` entries are rendered.
/// Cloning shares the same queue.
#[derive(Debug, Clone)]
pub struct ToastQueue {
    toasts: Arc<Mutex<Vec<Toast>>>,
    events: broadcast::Sender<Toast>,
    ttl: Duration,
    max_visible: usize,
}

impl ToastQueue {
    pub fn new(config: &ToastConfig) -> Self {
        Self {
            toasts: Arc::new(Mutex::new(Vec::new())),
            events: broadcast::channel(CHANNEL_CAPACITY).0,
            ttl: config.ttl(),
            max_visible: config.max_visible,
        }
    }

    /// Queue a toast and schedule its removal. Must run inside a tokio runtime.
    pub fn push(&self, title: &str, body: Option<&str>) -> Uuid {
        let toast = Toast {
            id: Uuid::new_v4(),
            title: if title.is_empty() {
                DEFAULT_TITLE.to_string()
            } else {
                title.to_string()
            },
            body: body.filter(|b| !b.is_empty()).map(str::to_string),
        };
        let id = toast.id;

        self.toasts.lock().unwrap().insert(0, toast.clone());
        let _ = self.events.send(toast);

        let toasts = Arc::downgrade(&self.toasts);
        let ttl = self.ttl;
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(toasts) = toasts.upgrade() {
                // Already dismissed is fine
                toasts.lock().unwrap().retain(|t| t.id != id);
            }
        });

        id
    }

    /// Remove a toast before its timer fires. Returns false if it was already gone.
    pub fn dismiss(&self, id: Uuid) -> bool {
        let mut toasts = self.toasts.lock().unwrap();
        let before = toasts.len();
        toasts.retain(|t| t.id != id);
        toasts.len() != before
    }

    /// The toasts a renderer should draw, newest first
    pub fn visible(&self) -> Vec<Toast> {
        self.toasts
            .lock()
            .unwrap()
            .iter()
            .take(self.max_visible)
            .cloned()
            .collect()
    }

    /// Everything still queued, including toasts outside the visible window
    pub fn queued(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.toasts.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stream of toasts as they are pushed
    pub fn subscribe(&self) -> broadcast::Receiver<Toast> {
        self.events.subscribe()
    }
}

impl Default for ToastQueue {
    fn default() -> Self {
        Self::new(&ToastConfig::default())
    }
}
