use playconnect_common::models::notification::{Notification, NotificationQuery};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::backend::{mark_all_read, NotificationBackend};
use crate::signal::NotificationSignal;

/// Badge text for an unread count: nothing for zero, capped at "99+".
pub fn badge_label(count: u64) -> Option<String> {
    match count {
        0 => None,
        1..=99 => Some(count.to_string()),
        _ => Some("99+".to_string()),
    }
}

/// What the bell currently shows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BellState {
    pub unread_count: u64,
    pub items: Vec<Notification>,
    pub open: bool,
}

/// Unread badge plus a dropdown of recent notifications for one user.
///
/// Refreshes its count whenever the [`NotificationSignal`] is bumped, so it
/// needs no reference to the poller. Dropping the bell stops the listener.
pub struct NotificationBell {
    user_id: i64,
    backend: Arc<dyn NotificationBackend>,
    state: Arc<Mutex<BellState>>,
    recent_limit: u32,
    /// Sequence of the latest dropdown load; older responses are dropped
    load_seq: AtomicU64,
    listener: JoinHandle<()>,
}

impl NotificationBell {
    /// Load the unread count and start listening for bumps.
    pub async fn mount(
        user_id: i64,
        backend: Arc<dyn NotificationBackend>,
        signal: &NotificationSignal,
        recent_limit: u32,
    ) -> Self {
        let state = Arc::new(Mutex::new(BellState::default()));
        // Subscribe first so a bump during the initial load is not lost
        let mut bumps = signal.subscribe();
        refresh_count(backend.as_ref(), &state, user_id).await;

        let listener = {
            let backend = backend.clone();
            let state = state.clone();
            tokio::spawn(async move {
                loop {
                    match bumps.recv().await {
                        Ok(()) | Err(RecvError::Lagged(_)) => {
                            refresh_count(backend.as_ref(), &state, user_id).await;
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        };

        Self {
            user_id,
            backend,
            state,
            recent_limit,
            load_seq: AtomicU64::new(0),
            listener,
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn snapshot(&self) -> BellState {
        self.state.lock().unwrap().clone()
    }

    pub fn unread_count(&self) -> u64 {
        self.state.lock().unwrap().unread_count
    }

    pub fn badge(&self) -> Option<String> {
        badge_label(self.unread_count())
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().unwrap().open
    }

    pub fn items(&self) -> Vec<Notification> {
        self.state.lock().unwrap().items.clone()
    }

    /// Re-fetch the unread count now
    pub async fn refresh(&self) {
        refresh_count(self.backend.as_ref(), &self.state, self.user_id).await;
    }

    /// Flip the dropdown. Opening always reloads the recent list.
    pub async fn toggle(&self) -> bool {
        if self.is_open() {
            self.close();
            false
        } else {
            self.open().await;
            true
        }
    }

    /// Open the dropdown and load recent notifications; no-op if already open.
    #[tracing::instrument(skip(self), fields(user_id = self.user_id))]
    pub async fn open(&self) {
        let seq = {
            let mut state = self.state.lock().unwrap();
            if state.open {
                return;
            }
            state.open = true;
            self.load_seq.fetch_add(1, Ordering::SeqCst) + 1
        };

        let query = NotificationQuery::recent(self.user_id, self.recent_limit);
        let items = match self.backend.list_notifications(&query).await {
            Ok(items) => items,
            Err(e) => {
                tracing::debug!("Failed to load recent notifications: {}", e);
                Vec::new()
            }
        };

        let mut state = self.state.lock().unwrap();
        // Closed or reopened while loading
        if !state.open || self.load_seq.load(Ordering::SeqCst) != seq {
            tracing::debug!("Dropping stale recent notifications load");
            return;
        }
        state.items = items;
    }

    /// Close the dropdown (outside click, focus loss)
    pub fn close(&self) {
        self.state.lock().unwrap().open = false;
    }

    /// Mark every loaded unread item read.
    ///
    /// Local state flips immediately and the count drops to zero; the server
    /// calls run in the background and their failures are ignored.
    pub fn mark_all_read(&self) -> Vec<i64> {
        let ids: Vec<i64> = {
            let mut state = self.state.lock().unwrap();
            let ids = state
                .items
                .iter()
                .filter(|n| !n.is_read)
                .map(|n| n.notification_id)
                .collect();
            for item in state.items.iter_mut() {
                item.is_read = true;
            }
            state.unread_count = 0;
            ids
        };

        if !ids.is_empty() {
            let backend = self.backend.clone();
            let pending = ids.clone();
            tokio::spawn(async move {
                let total = pending.len();
                let succeeded = mark_all_read(backend, pending).await;
                if succeeded < total {
                    tracing::debug!("Marked {}/{} notifications read", succeeded, total);
                }
            });
        }
        ids
    }
}

impl Drop for NotificationBell {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn refresh_count(
    backend: &dyn NotificationBackend,
    state: &Mutex<BellState>,
    user_id: i64,
) {
    match backend.unread_count(user_id).await {
        Ok(count) => state.lock().unwrap().unread_count = count,
        Err(e) => tracing::debug!("Failed to refresh unread count: {}", e),
    }
}
