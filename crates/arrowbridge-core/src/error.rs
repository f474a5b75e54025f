use thiserror::Error;

/// Core error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    /// IO errors from the underlying storage
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow errors from the managed container library
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow_schema::ArrowError),

    /// Failures reported by the native file engine
    #[error("Engine error: {0}")]
    Engine(String),

    /// Schema message missing, truncated, or undecodable
    #[error("Schema error: {0}")]
    Schema(String),

    /// Batch description violated the exchange contract
    #[error("Malformed batch: {0}")]
    MalformedBatch(String),

    /// Operation issued against a session in the wrong state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid argument errors
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unsupported operation errors
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    /// Create a new engine error
    pub fn engine<S: Into<String>>(msg: S) -> Self {
        BridgeError::Engine(msg.into())
    }

    /// Create a new schema error
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        BridgeError::Schema(msg.into())
    }

    /// Create a new malformed batch error
    pub fn malformed_batch<S: Into<String>>(msg: S) -> Self {
        BridgeError::MalformedBatch(msg.into())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: Into<String>>(msg: S) -> Self {
        BridgeError::InvalidState(msg.into())
    }

    /// Create a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        BridgeError::InvalidArgument(msg.into())
    }

    /// Create a new unsupported operation error
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        BridgeError::Unsupported(msg.into())
    }
}
