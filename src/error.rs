use thiserror::Error;

/// Error kinds surfaced by the resource manager core.
///
/// Everything except `Fatal` is recovered locally by the caller: a failed
/// booking is a skipped candidate, a failed RPC disables the offending
/// application, a rejected state transition leaves the application alone.
#[derive(Debug, Error)]
pub enum Error {
    #[error("File not found or could not be read: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse JSON input: {0}")]
    DeserializationError(#[from] serde_json::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Already present: {0}")]
    AlreadyPresent(String),

    #[error("Resources exhausted: {0}")]
    Exhausted(String),

    #[error("Operation conflicts with the current state: {0}")]
    Conflict(String),

    #[error("No RPC reply within the sync deadline: {0}")]
    RpcTimeout(String),

    #[error("RPC channel failure: {0}")]
    RpcChannel(String),

    #[error("Platform enforcement failed: {0}")]
    PlatformEnforcement(String),

    #[error("Fatal internal error: {0}")]
    Fatal(String),
}

impl Error {
    /// True for errors a scheduling policy treats as "skip this candidate".
    pub fn is_skippable(&self) -> bool {
        matches!(self, Error::Exhausted(_) | Error::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
