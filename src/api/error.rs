use thiserror::Error;

/// Coarse error class, as presented to callers deciding whether to retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Domain,
    Validation,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Domain => "domain",
            ErrorKind::Validation => "validation",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

/// Failures surfaced by the client. `Clone` so a shared in-flight read can
/// hand the same failure to every waiter.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("network error: {0}")]
    Transport(String),

    #[error("http {status}: {message}")]
    Status { status: u16, message: String },

    #[error("{message} (code {code})")]
    Domain { code: i64, message: String },

    #[error("malformed response: {0}")]
    Decode(String),

    #[error("{0}")]
    Validation(String),

    #[error("request cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Transport(_) | ApiError::Status { .. } | ApiError::Decode(_) => {
                ErrorKind::Transport
            }
            ApiError::Domain { .. } => ErrorKind::Domain,
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        ApiError::Validation(msg.into())
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Transport(format!("timed out: {}", err))
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Decode(err.to_string())
    }
}
