pub mod api;
pub mod backend;
pub mod bell;
pub mod config;
pub mod error;
pub mod poller;
pub mod session;
pub mod signal;
pub mod state;
pub mod storage;
pub mod toast;

// Re-export commonly used items
pub use api::ApiClient;
pub use bell::NotificationBell;
pub use config::{load_config, ClientConfig};
pub use error::{ClientError, Result};
pub use poller::{NotificationPoller, PollerHandle, Visibility};
pub use session::{LoginOutcome, LogoutReason, SessionEvent, SessionManager};
pub use state::AppContext;
pub use toast::{Toast, ToastQueue};
