use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Kind of notification emitted by the backend
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Waitlist,
    GameUpdate,
    GameFull,
    GameCancelled,
    Reminder,
    /// `system` and anything the client does not know about
    #[serde(other)]
    Other,
}

impl NotificationType {
    /// Human title shown on the toast
    pub fn title(self) -> &'static str {
        match self {
            NotificationType::Waitlist => "Waitlist update",
            NotificationType::GameUpdate => "Game update",
            NotificationType::GameFull => "Game full",
            NotificationType::GameCancelled => "Game cancelled",
            NotificationType::Reminder => "Reminder",
            NotificationType::Other => "Notification",
        }
    }
}

/// A notification as returned by `GET /notifications`.
///
/// Ids are unique and strictly increasing within one user's stream, which is
/// what makes them usable as a `since_id` cursor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub notification_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<NaiveDateTime>,
}

/// Body of `GET /notifications/unread_count`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UnreadCount {
    #[serde(default)]
    pub unread_count: Option<u64>,
}

/// Query for `GET /notifications`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationQuery {
    pub user_id: i64,
    pub unread_only: bool,
    pub since_id: Option<i64>,
    pub limit: u32,
}

impl NotificationQuery {
    /// Unread notifications newer than `since_id`, as the poller asks for them
    pub fn unread_since(user_id: i64, since_id: Option<i64>, limit: u32) -> Self {
        Self {
            user_id,
            unread_only: true,
            since_id,
            limit,
        }
    }

    /// Most recent notifications, read or not
    pub fn recent(user_id: i64, limit: u32) -> Self {
        Self {
            user_id,
            unread_only: false,
            since_id: None,
            limit,
        }
    }

    /// Query-string pairs in the order the backend documents them
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("user_id", self.user_id.to_string())];
        if self.unread_only {
            pairs.push(("unread_only", "true".to_string()));
        }
        if let Some(since) = self.since_id {
            pairs.push(("since_id", since.to_string()));
        }
        pairs.push(("limit", self.limit.to_string()));
        pairs
    }
}
