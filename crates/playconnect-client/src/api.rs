use async_trait::async_trait;
use playconnect_common::models::notification::{Notification, NotificationQuery, UnreadCount};
use reqwest::{Method, RequestBuilder, Response};
use std::sync::Arc;

use crate::backend::NotificationBackend;
use crate::error::{ClientError, Result};
use crate::session::SessionManager;

/// HTTP client for the PlayConnect REST API.
///
/// Every request goes through [`ApiClient::send`], which refuses to send a
/// known-expired token and ends the session on any 401.
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Arc<str>,
    session: Arc<SessionManager>,
}

impl ApiClient {
    pub fn new(base_url: &str, session: Arc<SessionManager>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: Arc::from(base_url.trim_end_matches('/')),
            session,
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request against the API. Send it with [`ApiClient::send`].
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client.request(method, self.url(path))
    }

    /// Send a request through the session middleware.
    ///
    /// See [`SessionManager::send`]: expired tokens fail locally and a 401
    /// ends the session.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        self.session.send(request).await
    }

    /// Checks HTTP response status; returns the response on success or an error with details.
    async fn ensure_success(response: Response, operation: &'static str) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read body".to_string());
        Err(ClientError::Status {
            operation,
            status,
            body,
        })
    }

    /// Fetch notifications for a user
    #[tracing::instrument(skip(self))]
    pub async fn list_notifications(&self, query: &NotificationQuery) -> Result<Vec<Notification>> {
        let response = self
            .send(self.request(Method::GET, "/notifications").query(&query.to_pairs()))
            .await?;
        let response = Self::ensure_success(response, "list notifications").await?;
        Ok(response.json().await?)
    }

    /// Fetch the unread count. A body without a readable count yields 0.
    #[tracing::instrument(skip(self))]
    pub async fn unread_count(&self, user_id: i64) -> Result<u64> {
        let response = self
            .send(
                self.request(Method::GET, "/notifications/unread_count")
                    .query(&[("user_id", user_id)]),
            )
            .await?;
        let response = Self::ensure_success(response, "unread count").await?;
        let count: UnreadCount = response.json().await.unwrap_or_default();
        Ok(count.unread_count.unwrap_or(0))
    }

    /// Mark a single notification read
    #[tracing::instrument(skip(self))]
    pub async fn mark_read(&self, notification_id: i64) -> Result<()> {
        let path = format!("/notifications/{}/read", notification_id);
        let response = self.send(self.request(Method::PATCH, &path)).await?;
        Self::ensure_success(response, "mark read").await?;
        Ok(())
    }
}

#[async_trait]
impl NotificationBackend for ApiClient {
    async fn list_notifications(&self, query: &NotificationQuery) -> Result<Vec<Notification>> {
        ApiClient::list_notifications(self, query).await
    }

    async fn unread_count(&self, user_id: i64) -> Result<u64> {
        ApiClient::unread_count(self, user_id).await
    }

    async fn mark_read(&self, notification_id: i64) -> Result<()> {
        ApiClient::mark_read(self, notification_id).await
    }
}
