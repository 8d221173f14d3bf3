//! Audio error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no audio device: {0}")]
    DeviceNotFound(String),

    #[error("stream configuration error: {0}")]
    ConfigError(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("audio backend error: {0}")]
    BackendError(String),
}

pub type AudioResult<T> = Result<T, AudioError>;
