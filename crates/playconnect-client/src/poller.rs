use playconnect_common::models::notification::{Notification, NotificationQuery};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::NotificationBackend;
use crate::config::PollerConfig;
use crate::signal::NotificationSignal;
use crate::toast::ToastQueue;

/// Whether the host is in front of the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Dedupe state for one user: ids already toasted plus the `since_id` cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeenState {
    last_seen_id: Option<i64>,
    seen: HashSet<i64>,
}

impl SeenState {
    pub fn cursor(&self) -> Option<i64> {
        self.last_seen_id
    }

    pub fn contains(&self, notification_id: i64) -> bool {
        self.seen.contains(&notification_id)
    }

    /// Advance the cursor and return the notifications not seen before.
    ///
    /// The cursor only moves forward, even if the batch holds older ids.
    fn absorb(&mut self, batch: &[Notification]) -> Vec<Notification> {
        let batch_max = batch.iter().map(|n| n.notification_id).max();
        self.last_seen_id = self.last_seen_id.max(batch_max);

        batch
            .iter()
            .filter(|n| self.seen.insert(n.notification_id))
            .cloned()
            .collect()
    }
}

/// Dedupe state for every user, shared by all pollers in the process.
///
/// Outlives individual pollers so a restarted poller does not re-toast, and
/// is keyed by user id so a second account in the same process starts clean.
#[derive(Debug, Default)]
pub struct DedupeRegistry {
    users: Mutex<HashMap<i64, SeenState>>,
}

impl DedupeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cursor(&self, user_id: i64) -> Option<i64> {
        self.users
            .lock()
            .unwrap()
            .get(&user_id)
            .and_then(SeenState::cursor)
    }

    pub fn snapshot(&self, user_id: i64) -> SeenState {
        self.users
            .lock()
            .unwrap()
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Record a fetched batch; returns the notifications to toast
    pub fn absorb(&self, user_id: i64, batch: &[Notification]) -> Vec<Notification> {
        self.users
            .lock()
            .unwrap()
            .entry(user_id)
            .or_default()
            .absorb(batch)
    }
}

/// What a single poll tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Host hidden; nothing fetched or delivered
    Hidden,
    /// Fetched, nothing new
    Empty,
    /// Batch processed; ids that produced a toast
    Delivered(Vec<i64>),
    /// Fetch failed; retried on the next tick
    Failed,
}

/// Periodic pull of unread notifications for one user.
///
/// Each tick fetches unread notifications past the cursor, toasts the ones
/// not seen before, marks them read in the background and bumps the bell.
pub struct NotificationPoller {
    user_id: i64,
    backend: Arc<dyn NotificationBackend>,
    toasts: ToastQueue,
    signal: NotificationSignal,
    dedupe: Arc<DedupeRegistry>,
    visibility: watch::Receiver<Visibility>,
    config: PollerConfig,
}

impl NotificationPoller {
    pub fn new(
        user_id: i64,
        backend: Arc<dyn NotificationBackend>,
        toasts: ToastQueue,
        signal: NotificationSignal,
        dedupe: Arc<DedupeRegistry>,
        visibility: watch::Receiver<Visibility>,
        config: PollerConfig,
    ) -> Self {
        Self {
            user_id,
            backend,
            toasts,
            signal,
            dedupe,
            visibility,
            config,
        }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    fn is_visible(&self) -> bool {
        *self.visibility.borrow() == Visibility::Visible
    }

    /// Run one poll cycle. Never fails; errors are logged and dropped.
    #[tracing::instrument(skip(self), fields(user_id = self.user_id))]
    pub async fn tick(&self) -> TickOutcome {
        if !self.is_visible() {
            return TickOutcome::Hidden;
        }

        let query = NotificationQuery::unread_since(
            self.user_id,
            self.dedupe.cursor(self.user_id),
            self.config.page_size,
        );
        let batch = match self.backend.list_notifications(&query).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::debug!("Notification poll failed: {}", e);
                return TickOutcome::Failed;
            }
        };

        if batch.is_empty() {
            return TickOutcome::Empty;
        }
        // Hidden while the fetch was in flight; the same items come back next time
        if !self.is_visible() {
            return TickOutcome::Hidden;
        }

        let fresh = self.dedupe.absorb(self.user_id, &batch);
        for notification in &fresh {
            self.toasts.push(
                notification.kind.title(),
                Some(notification.message.as_str()),
            );

            let backend = self.backend.clone();
            let id = notification.notification_id;
            tokio::spawn(async move {
                if let Err(e) = backend.mark_read(id).await {
                    tracing::debug!("Failed to mark notification {} read: {}", id, e);
                }
            });
        }
        self.signal.bump();

        if !fresh.is_empty() {
            tracing::debug!("Delivered {} new notifications", fresh.len());
        }
        TickOutcome::Delivered(fresh.iter().map(|n| n.notification_id).collect())
    }

    /// Start polling in the background: one tick now, then one per interval.
    pub fn spawn(self) -> PollerHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(self.run(cancel.clone()));
        PollerHandle {
            cancel,
            task: Some(task),
        }
    }

    async fn run(self, cancel: CancellationToken) {
        let mut visibility = self.visibility.clone();
        let _ = visibility.borrow_and_update();
        let interval = self.config.interval();

        tracing::info!(
            "Polling notifications for user {} every {}ms",
            self.user_id,
            interval.as_millis()
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.tick().await;
            // An in-flight tick finishing after stop must not re-arm the timer
            if cancel.is_cancelled() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
                _ = became_visible(&mut visibility) => {
                    tracing::debug!("Host visible again, polling now");
                }
            }
        }

        tracing::debug!("Notification poller for user {} stopped", self.user_id);
    }
}

/// Resolves on the next Hidden -> Visible transition; never if the sender is gone.
async fn became_visible(visibility: &mut watch::Receiver<Visibility>) {
    loop {
        if visibility.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
        if *visibility.borrow_and_update() == Visibility::Visible {
            return;
        }
    }
}

/// Owner of a running poller. Dropping it stops the poller.
pub struct PollerHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Stop scheduling ticks. A tick already in flight runs to completion.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop and wait for the background task to exit.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
