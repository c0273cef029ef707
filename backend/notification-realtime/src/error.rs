use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

/// Failures of the REST-style notification API
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("could not decode response: {0}")]
    Decode(String),

    #[error(transparent)]
    Timeout(#[from] resilience::TimeoutError),
}

/// Failures opening or reading a push channel
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Channel drop, DNS failure, timeout. Retried with backoff.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server refused the subscription itself. Never retried.
    #[error("subscription rejected: {0}")]
    Subscription(String),
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("subscription rejected: {0}")]
    Subscription(String),

    /// A user-initiated mutation failed remotely; local state was reverted or resynced
    #[error("{operation} failed: {message}")]
    Operation {
        operation: &'static str,
        message: String,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl From<TransportError> for AppError {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Transport(msg) => AppError::Transport(msg),
            TransportError::Subscription(msg) => AppError::Subscription(msg),
        }
    }
}

impl AppError {
    pub fn operation(operation: &'static str, source: impl std::fmt::Display) -> Self {
        AppError::Operation {
            operation,
            message: source.to_string(),
        }
    }

    /// Only transport failures are worth retrying automatically
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Transport(_))
    }
}
