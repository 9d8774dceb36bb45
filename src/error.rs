//! Error types for per-row and per-asset failures.
//!
//! Both are absorbed close to where they happen: a `RowError` skips one
//! row, a `FetchError` turns into a failed asset resolution. Only file I/O
//! on the input and the persisted collections reaches `main` (as `anyhow`).

use thiserror::Error;

/// Failure to turn one raw row or JSON entry into a `Record`.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("no usable id (field {0:?}, no subject URL to recover from)")]
    MissingId(String),

    #[error("unparseable mark date: {0:?}")]
    BadDate(String),

    #[error("rating {0:?} outside 1..5")]
    RatingOutOfRange(String),

    #[error("malformed entry: {0}")]
    Malformed(String),

    #[error("invalid JSON entry: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure while fetching a source page or an image.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Timeout | FetchError::Transport(_) => true,
            FetchError::Status(code) => *code >= 500 || *code == 429,
            FetchError::Io(_) => false,
        }
    }
}
