//! vav-render: GPU audio-reactive visuals for VAV
//!
//! Three fragment passes turn four 50 ms audio windows plus per-channel
//! parameters into a 1920×1080 RGB frame: per-channel waveform fields,
//! rotation with scale compensation, then a continuous blend morph with
//! optional region-map filtering and a camera layer.
//!
//! `Renderer` has exactly three implementors, chosen at engine
//! construction and never substituted at runtime:
//! - `MultiverseRenderer` — the wgpu pipeline
//! - `CpuRenderer` — black frames, keeps the host alive after GPU loss
//! - `NullRenderer` — headless runs

mod context;
mod error;
pub mod math;
mod multiverse;
pub mod reference;

pub use context::GpuContext;
pub use error::{RenderError, RenderResult};
pub use multiverse::{
    AudioWindow, CameraImage, MultiverseRenderer, RENDER_HEIGHT, RENDER_WIDTH, RegionMapData,
    RenderInputs, RenderParams,
};

/// A frame producer. `render` never fails outward: implementations return
/// their previous frame (or zeros) when a pass goes wrong.
pub trait Renderer: Send {
    /// Produce the next RGB frame (`width * height * 3` bytes).
    fn render(&mut self, inputs: &RenderInputs<'_>) -> &[u8];

    fn size(&self) -> (u32, u32);
}

/// Software fallback: emits black frames so the host survives GPU loss.
pub struct CpuRenderer {
    frame: Vec<u8>,
    width: u32,
    height: u32,
}

impl CpuRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        log::warn!("CPU fallback renderer active; output will be black");
        Self {
            frame: vec![0; (width * height * 3) as usize],
            width,
            height,
        }
    }
}

impl Renderer for CpuRenderer {
    fn render(&mut self, _inputs: &RenderInputs<'_>) -> &[u8] {
        &self.frame
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Headless renderer: zero-cost frames for `--no-gui` runs.
pub struct NullRenderer {
    frame: Vec<u8>,
    width: u32,
    height: u32,
}

impl NullRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            frame: vec![0; (width * height * 3) as usize],
            width,
            height,
        }
    }
}

impl Renderer for NullRenderer {
    fn render(&mut self, _inputs: &RenderInputs<'_>) -> &[u8] {
        &self.frame
    }

    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Build the best available renderer: GPU first, CPU fallback on any
/// initialization failure.
pub fn create_renderer(audio_width: u32, headless: bool) -> Box<dyn Renderer> {
    if headless {
        return Box::new(NullRenderer::new(RENDER_WIDTH, RENDER_HEIGHT));
    }
    match GpuContext::new_blocking() {
        Ok(ctx) => match MultiverseRenderer::new(std::sync::Arc::new(ctx), audio_width) {
            Ok(renderer) => return Box::new(renderer),
            Err(e) => log::error!("GPU renderer init failed: {e}"),
        },
        Err(e) => log::error!("GPU context init failed: {e}"),
    }
    Box::new(CpuRenderer::new(RENDER_WIDTH, RENDER_HEIGHT))
}
