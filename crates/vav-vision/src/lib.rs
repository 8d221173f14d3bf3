//! vav-vision: Camera frames to control voltages
//!
//! Per camera frame: grayscale → Sobel edges → scene-change check →
//! external contour extraction → anchor-closest selection → curvature
//! weighting → variable-speed cursor advance → five CVs plus trigger
//! events.
//!
//! Frame acquisition is a pull API (`FrameSource`); concrete providers
//! here are a deterministic test pattern and an image-sequence player
//! with background pre-read. The engine swaps sources atomically from
//! the vision loop's point of view.

mod contour;
mod error;
mod region;
mod scanner;
mod source;

pub use contour::{Contour, extract_contours, grayscale, mean_absdiff, sobel_magnitude};
pub use error::{VisionError, VisionResult};
pub use region::RegionMap;
pub use scanner::{FrameOutput, ContourScanner};
pub use source::{Frame, FrameSource, ImageSequenceSource, TestPatternSource};
