//! Error types for VAV

use thiserror::Error;

/// Core error type
#[derive(Error, Debug)]
pub enum VavError {
    #[error("Audio error: {0}")]
    Audio(String),

    #[error("Vision error: {0}")]
    Vision(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid parameter: {0}")]
    InvalidParam(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("State error: {0}")]
    State(String),
}

/// Result type alias
pub type VavResult<T> = Result<T, VavError>;
