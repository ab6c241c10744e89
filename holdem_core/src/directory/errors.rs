//! Directory adapter error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DirectoryError {
    /// Token missing, malformed, expired, or rejected by the directory.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The directory rejected the request.
    #[error("directory rejected request: {0}")]
    Rejected(String),

    /// Transport-level failure talking to the directory.
    #[error("directory unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),

    /// The directory answered with something we could not parse.
    #[error("unexpected directory response: {0}")]
    BadResponse(String),
}

pub type DirectoryResult<T> = Result<T, DirectoryError>;
