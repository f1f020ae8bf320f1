use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("HTTP status {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Timeout(_) | BridgeError::Io(_) | BridgeError::OperationFailed(_) => true,
            BridgeError::Http { status, .. } => *status >= 500 || *status == 429,
            BridgeError::NotAvailable(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
