// Error types for bamboo-stash.
// Covers filesystem, serialization, and cache directory resolution failures.

use thiserror::Error;

use crate::cache::canonical::EncodeError;

#[derive(Error, Debug)]
pub enum StashError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Cannot encode call arguments: {0}")]
    Args(#[from] EncodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not determine a cache directory for this user")]
    NoCacheDir,
}

pub type Result<T> = std::result::Result<T, StashError>;
