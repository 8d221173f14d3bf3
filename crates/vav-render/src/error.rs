//! Render error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("GPU initialization failed: {0}")]
    GpuInit(String),
    #[error("Shader compilation failed: {0}")]
    Shader(String),
    #[error("Buffer creation failed: {0}")]
    Buffer(String),
    #[error("Render failed: {0}")]
    Render(String),
}

pub type RenderResult<T> = Result<T, RenderError>;
