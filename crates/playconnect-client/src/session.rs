use chrono::{DateTime, Utc};
use playconnect_common::models::auth::{
    ErrorBody, LoginRequest, Session, TokenResponse, UserSummary,
};
use playconnect_common::token::is_token_expired_at;
use reqwest::{RequestBuilder, Response, StatusCode};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::DEFAULT_EXPIRY_CHECK_INTERVAL;
use crate::error::{ClientError, Result};
use crate::storage::{KeyValueStore, AUTH_TOKEN_KEY, SESSION_KEYS, USER_DATA_KEY, USER_ID_KEY};

const EVENT_CAPACITY: usize = 16;

/// Routes reachable without a session. Forced logouts never redirect from these.
pub const PUBLIC_ROUTES: [&str; 3] = ["/", "/login", "/signup"];

/// Where a host should send the user after a forced logout, if anywhere.
pub fn login_redirect(current_route: &str) -> Option<&'static str> {
    let route = current_route.split(['?', '#']).next().unwrap_or_default();
    let route = match route.trim_end_matches('/') {
        "" => "/",
        trimmed => trimmed,
    };
    if PUBLIC_ROUTES.contains(&route) {
        None
    } else {
        Some("/login")
    }
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    UserRequested,
    TokenExpired,
    Unauthorized,
}

impl LogoutReason {
    /// Forced logouts are the ones a host should follow with a redirect
    pub fn is_forced(self) -> bool {
        !matches!(self, LogoutReason::UserRequested)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    LoggedIn(Session),
    LoggedOut { reason: LogoutReason },
}

/// Result of [`SessionManager::login`]
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    Success(Session),
    /// The backend answered with an error; `error` is its `detail`
    Rejected {
        error: String,
        needs_verification: bool,
    },
    /// The request never got an answer
    NetworkError,
}

impl LoginOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, LoginOutcome::Success(_))
    }

    /// Message suitable for showing next to the login form
    pub fn error_message(&self) -> Option<&str> {
        match self {
            LoginOutcome::Success(_) => None,
            LoginOutcome::Rejected { error, .. } => Some(error),
            LoginOutcome::NetworkError => Some("Network error"),
        }
    }

    pub fn needs_verification(&self) -> bool {
        matches!(
            self,
            LoginOutcome::Rejected {
                needs_verification: true,
                ..
            }
        )
    }
}

/// Result of [`SessionManager::request_password_reset`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordResetOutcome {
    Sent,
    Rejected(String),
    NetworkError,
}

fn mentions_verification(detail: &str) -> bool {
    let detail = detail.to_lowercase();
    detail.contains("not verified") || detail.contains("verify")
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Single owner of the authentication state.
///
/// Persists the session in a [`KeyValueStore`], re-checks token expiry on a
/// timer while logged in, and ends the session when the token expires or the
/// backend answers 401. Logging out is idempotent: only the call that
/// actually ends a session emits [`SessionEvent::LoggedOut`].
pub struct SessionManager {
    http: reqwest::Client,
    base_url: Arc<str>,
    store: Arc<dyn KeyValueStore>,
    current: RwLock<Option<Session>>,
    events: broadcast::Sender<SessionEvent>,
    watcher: Mutex<Option<JoinHandle<()>>>,
    check_interval: Duration,
    clock: Clock,
}

impl SessionManager {
    pub fn new(base_url: &str, store: Arc<dyn KeyValueStore>, check_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            http: reqwest::Client::new(),
            base_url: Arc::from(base_url.trim_end_matches('/')),
            store,
            current: RwLock::new(None),
            events,
            watcher: Mutex::new(None),
            check_interval: if check_interval.is_zero() {
                DEFAULT_EXPIRY_CHECK_INTERVAL
            } else {
                check_interval
            },
            clock: Arc::new(Utc::now),
        }
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    pub fn with_http_client(mut self, client: reqwest::Client) -> Self {
        self.http = client;
        self
    }

    /// Replace the wall clock used for expiry checks.
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn current_user(&self) -> Option<Session> {
        self.current.read().unwrap().clone()
    }

    pub fn current_user_id(&self) -> Option<i64> {
        self.current.read().unwrap().as_ref().map(|s| s.user_id)
    }

    pub fn token(&self) -> Option<String> {
        self.current.read().unwrap().as_ref().map(|s| s.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.current.read().unwrap().is_some()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Expiry check using this manager's clock
    pub fn is_token_expired(&self, token: &str) -> bool {
        is_token_expired_at(token, (self.clock)())
    }

    /// True while the periodic expiry check is armed
    pub fn is_watching(&self) -> bool {
        self.watcher
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Authenticate against `POST /login` and persist the session.
    ///
    /// Credential and network failures come back as [`LoginOutcome`] values;
    /// `Err` only means the session could not be written to storage.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(self: &Arc<Self>, email: &str, password: &str) -> Result<LoginOutcome> {
        let url = format!("{}/login", self.base_url);
        let req = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };

        let response = match self.http.post(&url).json(&req).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Login request failed: {}", e);
                return Ok(LoginOutcome::NetworkError);
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body: ErrorBody = response.json().await.unwrap_or_default();
            let error = body.detail.unwrap_or_else(|| "Login failed".to_string());
            tracing::info!("Login rejected with status {}: {}", status, error);
            return Ok(LoginOutcome::Rejected {
                needs_verification: mentions_verification(&error),
                error,
            });
        }

        let token: TokenResponse = match response.json().await {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!("Failed to parse login response: {}", e);
                return Ok(LoginOutcome::Rejected {
                    error: "Login failed".to_string(),
                    needs_verification: false,
                });
            }
        };

        let session = Session {
            user_id: token.user_id,
            email: email.to_string(),
            role: token.role,
            token: token.access_token,
            first_name: None,
            last_name: None,
        };

        self.persist(&session)?;
        *self.current.write().unwrap() = Some(session.clone());
        self.start_watcher();
        let _ = self.events.send(SessionEvent::LoggedIn(session.clone()));
        tracing::info!("Logged in as user {}", session.user_id);

        match self.enrich(session).await {
            Some(session) => Ok(LoginOutcome::Success(session)),
            // The backend refused the fresh token during the name lookup
            None => Ok(LoginOutcome::Rejected {
                error: "Login failed".to_string(),
                needs_verification: false,
            }),
        }
    }

    /// Explicit logout. Safe to call when already logged out.
    pub fn logout(&self) -> bool {
        self.end_session(LogoutReason::UserRequested)
    }

    /// End the session because the token stopped working.
    pub fn force_logout(&self, reason: LogoutReason) -> bool {
        self.end_session(reason)
    }

    /// Log out if the current token is expired. Returns true if it did.
    ///
    /// Runs on the periodic timer and whenever the host regains focus.
    pub fn check_expiry(&self) -> bool {
        let expired = self
            .current
            .read()
            .unwrap()
            .as_ref()
            .is_some_and(|s| self.is_token_expired(&s.token));
        if expired {
            tracing::info!("Session token expired");
            return self.end_session(LogoutReason::TokenExpired);
        }
        false
    }

    /// Pick up a session persisted by an earlier run.
    ///
    /// Unparseable user data and expired tokens are cleared before anything
    /// else sees them. Missing names are filled in on a best-effort basis.
    pub async fn restore(self: &Arc<Self>) -> Result<Option<Session>> {
        let (Some(token), Some(user_data)) =
            (self.store.get(AUTH_TOKEN_KEY), self.store.get(USER_DATA_KEY))
        else {
            return Ok(None);
        };

        let mut session: Session = match serde_json::from_str(&user_data) {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!("Discarding unreadable stored session: {}", e);
                self.clear_storage();
                return Ok(None);
            }
        };
        session.token = token;

        if self.is_token_expired(&session.token) {
            tracing::info!("Stored session token already expired");
            self.clear_storage();
            return Ok(None);
        }

        *self.current.write().unwrap() = Some(session.clone());
        self.start_watcher();

        let Some(session) = self.enrich(session).await else {
            return Ok(None);
        };
        tracing::debug!("Restored session for user {}", session.user_id);
        Ok(Some(session))
    }

    /// Ask the backend to send a password reset email.
    #[tracing::instrument(skip(self))]
    pub async fn request_password_reset(&self, email: &str) -> PasswordResetOutcome {
        let url = format!("{}/forgot-password", self.base_url);
        let response = match self
            .http
            .post(&url)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Password reset request failed: {}", e);
                return PasswordResetOutcome::NetworkError;
            }
        };

        if response.status().is_success() {
            return PasswordResetOutcome::Sent;
        }
        let body: ErrorBody = response.json().await.unwrap_or_default();
        PasswordResetOutcome::Rejected(
            body.detail
                .unwrap_or_else(|| "Could not send reset email.".to_string()),
        )
    }

    /// Send a request with the current bearer token attached.
    ///
    /// Fails with [`ClientError::SessionExpired`] without touching the network
    /// if the token is already expired. A 401 response ends the session but is
    /// still returned to the caller.
    pub async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match self.token() {
            Some(token) if self.is_token_expired(&token) => {
                tracing::info!("Refusing to send request with an expired token");
                self.force_logout(LogoutReason::TokenExpired);
                return Err(ClientError::SessionExpired);
            }
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::warn!("Request to {} was unauthorized", response.url().path());
            self.force_logout(LogoutReason::Unauthorized);
        }
        Ok(response)
    }

    /// Fill in missing names for the installed session.
    ///
    /// Returns `None` if the session ended while the lookup was in flight.
    /// Lookup and storage failures leave the session as it was.
    async fn enrich(&self, mut session: Session) -> Option<Session> {
        if session.has_names() {
            return Some(session);
        }
        let names = self.fetch_names(session.user_id, &session.email).await;

        let mut current = self.current.write().unwrap();
        if !current.as_ref().is_some_and(|c| c.token == session.token) {
            return None;
        }
        let Some(names) = names else {
            return Some(session);
        };
        session.first_name = names.first_name;
        session.last_name = names.last_name;
        *current = Some(session.clone());
        drop(current);

        let written = serde_json::to_string(&session)
            .map_err(ClientError::from)
            .and_then(|data| self.store.set(USER_DATA_KEY, &data));
        if let Err(e) = written {
            tracing::warn!("Failed to store enriched session: {}", e);
        }
        Some(session)
    }

    /// Look up first/last name via `GET /users`. Failures yield `None`.
    async fn fetch_names(&self, user_id: i64, email: &str) -> Option<UserSummary> {
        let url = format!("{}/users", self.base_url);
        let response = match self.send(self.http.get(&url)).await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                tracing::debug!("User lookup returned {}", response.status());
                return None;
            }
            Err(e) => {
                tracing::debug!("User lookup failed: {}", e);
                return None;
            }
        };
        let users: Vec<UserSummary> = response.json().await.ok()?;
        users
            .into_iter()
            .find(|u| u.user_id == user_id || u.email.as_deref() == Some(email))
    }

    fn persist(&self, session: &Session) -> Result<()> {
        self.store.set(AUTH_TOKEN_KEY, &session.token)?;
        self.store
            .set(USER_DATA_KEY, &serde_json::to_string(session)?)?;
        self.store.set(USER_ID_KEY, &session.user_id.to_string())?;
        Ok(())
    }

    fn clear_storage(&self) {
        for key in SESSION_KEYS {
            if let Err(e) = self.store.remove(key) {
                tracing::warn!("Failed to clear '{}' from session storage: {}", key, e);
            }
        }
    }

    fn end_session(&self, reason: LogoutReason) -> bool {
        let previous = self.current.write().unwrap().take();
        self.clear_storage();
        self.stop_watcher();

        match previous {
            Some(session) => {
                tracing::info!("Session for user {} ended ({:?})", session.user_id, reason);
                let _ = self.events.send(SessionEvent::LoggedOut { reason });
                true
            }
            None => false,
        }
    }

    fn start_watcher(self: &Arc<Self>) {
        let manager: Weak<Self> = Arc::downgrade(self);
        let period = self.check_interval;
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                interval.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                if manager.check_expiry() {
                    break;
                }
            }
        });

        if let Some(old) = self.watcher.lock().unwrap().replace(handle) {
            old.abort();
        }
    }

    fn stop_watcher(&self) {
        if let Some(handle) = self.watcher.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.stop_watcher();
    }
}
