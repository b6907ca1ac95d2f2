//! Error types for Coda

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Track {0} does not exist")]
    TrackNotFound(usize),

    #[error("Send slot {0} out of range")]
    SendOutOfRange(usize),

    #[error("Insert slot {0} out of range")]
    InsertOutOfRange(usize),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias
pub type CoreResult<T> = Result<T, CoreError>;
