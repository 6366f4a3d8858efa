use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KvError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Remote store error: {0}")]
    Remote(String),

    #[error("Remote store did not respond within {0} ms")]
    Timeout(u64),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Write coalescer is closed")]
    CoalescerClosed,

    #[error("Write coalescer task failed: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, KvError>;

impl KvError {
    /// True for failures of the remote collaborator itself (as opposed to
    /// bad input or bad stored bytes).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Timeout(_))
    }
}
