//! Error taxonomy for the kiosk client.

use reqwest::StatusCode;

/// Fallback shown to the operator when the backend gave no `detail`.
pub const UNKNOWN_ERROR: &str = "unknown error";

/// A failed exchange with the backend.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RemoteError {
    #[error("cannot reach backend at {url}: {message}")]
    Transport { url: String, message: String },

    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("backend returned HTTP {}{}", .status.as_u16(), fmt_detail(.detail, .message))]
    Status {
        status: StatusCode,
        /// The `detail` field of the JSON error body, surfaced verbatim.
        detail: Option<String>,
        /// `error`/`message` field or raw body text, for logs only.
        message: Option<String>,
    },

    #[error("invalid JSON from backend: {0}")]
    Decode(String),
}

fn fmt_detail(detail: &Option<String>, message: &Option<String>) -> String {
    match (detail, message) {
        (Some(d), _) => format!(": {d}"),
        (None, Some(m)) => format!(": {m}"),
        (None, None) => String::new(),
    }
}

impl RemoteError {
    pub fn detail(&self) -> Option<&str> {
        match self {
            RemoteError::Status {
                detail: Some(detail),
                ..
            } => Some(detail.as_str()),
            _ => None,
        }
    }

    /// Whether repeating the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Transport { .. } | RemoteError::Timeout { .. } => true,
            RemoteError::Status { status, .. } => status.is_server_error(),
            RemoteError::Decode(_) => false,
        }
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum KioskError {
    /// Rejected locally; no request was made.
    #[error("validation error: {0}")]
    Validation(String),

    /// Another order submission is still waiting for the backend.
    #[error("order submission already in progress")]
    Busy,

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl KioskError {
    /// Text to show the operator for a failed action.
    pub fn user_message(&self) -> String {
        match self {
            KioskError::Validation(reason) => reason.clone(),
            KioskError::Busy => self.to_string(),
            KioskError::Remote(err) => err.detail().unwrap_or(UNKNOWN_ERROR).to_string(),
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, KioskError::Validation(_))
    }
}
