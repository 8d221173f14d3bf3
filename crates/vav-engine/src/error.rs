//! Engine error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Audio(#[from] vav_audio::AudioError),

    #[error(transparent)]
    Vision(#[from] vav_vision::VisionError),

    #[error(transparent)]
    Render(#[from] vav_render::RenderError),

    #[error("MIDI error: {0}")]
    Midi(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("engine state error: {0}")]
    State(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
