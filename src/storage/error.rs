use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid path `{0}`")]
    InvalidPath(String),
    #[error("store misconfigured: {0}")]
    Misconfigured(String),
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
    #[error("listener cancelled: {0}")]
    Cancelled(String),
    #[error("listener lagged behind by {0} events")]
    Lagged(u64),
}
