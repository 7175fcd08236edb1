/// Errors surfaced by the PlayConnect client library.
///
/// Notification-pipeline callers swallow these; only login and the CLI ever
/// show them to a person.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The stored token was already expired, so the request was never sent
    #[error("session expired")]
    SessionExpired,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} failed with status {status}: {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
