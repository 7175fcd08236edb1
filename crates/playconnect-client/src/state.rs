use crate::api::ApiClient;
use crate::backend::NotificationBackend;
use crate::bell::NotificationBell;
use crate::config::ClientConfig;
use crate::poller::{DedupeRegistry, NotificationPoller, PollerHandle, Visibility};
use crate::session::SessionManager;
use crate::signal::NotificationSignal;
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::toast::ToastQueue;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared client state: one session, one toast queue, one bump signal
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ClientConfig>,
    pub session: Arc<SessionManager>,
    pub api: ApiClient,
    pub toasts: ToastQueue,
    pub signal: NotificationSignal,
    pub dedupe: Arc<DedupeRegistry>,
    visibility: Arc<watch::Sender<Visibility>>,
}

impl AppContext {
    /// Create a context over the given session store
    pub fn new(config: ClientConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let session = Arc::new(SessionManager::new(
            &config.api_base_url,
            store,
            config.session.expiry_check_interval(),
        ));
        Self::with_session(config, session)
    }

    /// Create a context around an already configured session manager
    pub fn with_session(config: ClientConfig, session: Arc<SessionManager>) -> Self {
        let api = ApiClient::new(&config.api_base_url, session.clone());
        let toasts = ToastQueue::new(&config.toasts);
        let (visibility, _) = watch::channel(Visibility::Visible);
        Self {
            config: Arc::new(config),
            session,
            api,
            toasts,
            signal: NotificationSignal::new(),
            dedupe: Arc::new(DedupeRegistry::new()),
            visibility: Arc::new(visibility),
        }
    }

    /// Pick the session store from `storage_path`
    pub fn from_config(config: ClientConfig) -> Self {
        let store: Arc<dyn KeyValueStore> = match &config.storage_path {
            Some(path) => Arc::new(FileStore::new(path)),
            None => Arc::new(MemoryStore::new()),
        };
        Self::new(config, store)
    }

    pub fn backend(&self) -> Arc<dyn NotificationBackend> {
        Arc::new(self.api.clone())
    }

    /// A poller for `user_id` wired to this context, not yet started
    pub fn poller(&self, user_id: i64) -> NotificationPoller {
        NotificationPoller::new(
            user_id,
            self.backend(),
            self.toasts.clone(),
            self.signal.clone(),
            self.dedupe.clone(),
            self.visibility.subscribe(),
            self.config.poller.clone(),
        )
    }

    /// Start polling for `user_id` on a background task
    pub fn spawn_poller(&self, user_id: i64) -> PollerHandle {
        self.poller(user_id).spawn()
    }

    pub async fn mount_bell(&self, user_id: i64) -> NotificationBell {
        NotificationBell::mount(
            user_id,
            self.backend(),
            &self.signal,
            self.config.bell.recent_limit,
        )
        .await
    }

    pub fn visibility(&self) -> Visibility {
        *self.visibility.borrow()
    }

    /// Record a visibility change.
    ///
    /// Becoming visible re-checks the token and wakes pollers for an
    /// immediate tick.
    pub fn set_visibility(&self, visibility: Visibility) {
        if visibility == Visibility::Visible {
            self.session.check_expiry();
        }
        self.visibility.send_replace(visibility);
    }
}
