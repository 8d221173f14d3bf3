//! Vision error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    #[error("camera unavailable: {0}")]
    CameraUnavailable(String),

    #[error("frame resolution changed: {0}x{1}")]
    ResolutionChanged(u32, u32),

    #[error("no valid contour in frame")]
    ContourMissing,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type VisionResult<T> = Result<T, VisionError>;
