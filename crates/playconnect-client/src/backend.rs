use async_trait::async_trait;
use playconnect_common::models::notification::{Notification, NotificationQuery};
use std::sync::Arc;

use crate::error::Result;

/// Notification endpoints the poller and bell depend on.
///
/// [`ApiClient`](crate::api::ApiClient) is the production implementation.
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    async fn list_notifications(&self, query: &NotificationQuery) -> Result<Vec<Notification>>;
    async fn unread_count(&self, user_id: i64) -> Result<u64>;
    async fn mark_read(&self, notification_id: i64) -> Result<()>;
}

/// Mark every id read in parallel. Individual failures are dropped.
///
/// Returns how many calls succeeded.
pub async fn mark_all_read(backend: Arc<dyn NotificationBackend>, ids: Vec<i64>) -> usize {
    let handles: Vec<_> = ids
        .into_iter()
        .map(|id| {
            let backend = backend.clone();
            tokio::spawn(async move {
                match backend.mark_read(id).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::debug!("Failed to mark notification {} read: {}", id, e);
                        false
                    }
                }
            })
        })
        .collect();

    let mut succeeded = 0;
    for handle in handles {
        if matches!(handle.await, Ok(true)) {
            succeeded += 1;
        }
    }
    succeeded
}
