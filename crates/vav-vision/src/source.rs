//! Frame sources
//!
//! Pull API: `read_frame()` returns the next BGR frame or `None` when the
//! source has nothing (yet). Providers:
//! - `TestPatternSource` — deterministic synthetic frames for headless
//!   runs and tests
//! - `ImageSequenceSource` — a directory of stills decoded on a
//!   background pre-read thread, looping at the end of the sequence
//!
//! A live camera is a host-provided implementation of the same trait; the
//! engine swaps trait objects, so the vision loop never cares which
//! concrete provider is behind it.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, bounded};

use crate::{VisionError, VisionResult};

/// One BGR8 camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// Row-major BGR bytes, `width * height * 3` long.
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; (width * height * 3) as usize],
        }
    }

    #[inline]
    pub fn set_bgr(&mut self, x: u32, y: u32, b: u8, g: u8, r: u8) {
        let i = ((y * self.width + x) * 3) as usize;
        self.data[i] = b;
        self.data[i + 1] = g;
        self.data[i + 2] = r;
    }
}

/// Pull-style frame provider.
pub trait FrameSource: Send {
    /// Next frame, or `None` if nothing is available right now.
    fn read_frame(&mut self) -> Option<Frame>;

    /// Human-readable identity for logs and the GUI status line.
    fn describe(&self) -> String;
}

// ════════════════════════════════════════════════════════════════════
// Test pattern
// ════════════════════════════════════════════════════════════════════

/// Deterministic synthetic source: a bright rectangle orbiting a dark
/// background. Frame `n` is a pure function of `n`.
pub struct TestPatternSource {
    width: u32,
    height: u32,
    counter: u64,
}

impl TestPatternSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            counter: 0,
        }
    }
}

impl FrameSource for TestPatternSource {
    fn read_frame(&mut self) -> Option<Frame> {
        let mut frame = Frame::new(self.width, self.height);
        let t = self.counter as f32 * 0.05;
        self.counter += 1;

        // Rectangle orbiting the frame center.
        let cx = self.width as f32 * (0.5 + 0.25 * t.cos());
        let cy = self.height as f32 * (0.5 + 0.25 * t.sin());
        let rw = self.width / 4;
        let rh = self.height / 4;

        let x0 = (cx as u32).saturating_sub(rw / 2).min(self.width - 1);
        let y0 = (cy as u32).saturating_sub(rh / 2).min(self.height - 1);
        let x1 = (x0 + rw).min(self.width - 1);
        let y1 = (y0 + rh).min(self.height - 1);
        for y in y0..y1 {
            for x in x0..x1 {
                frame.set_bgr(x, y, 230, 230, 230);
            }
        }
        Some(frame)
    }

    fn describe(&self) -> String {
        format!("test pattern {}x{}", self.width, self.height)
    }
}

// ════════════════════════════════════════════════════════════════════
// Image sequence
// ════════════════════════════════════════════════════════════════════

/// Plays a directory of stills as a looping video, decoding ahead on a
/// background thread so `read_frame` never stalls on the decoder.
pub struct ImageSequenceSource {
    rx: Receiver<Frame>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    dir: PathBuf,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path) -> VisionResult<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("png") | Some("jpg") | Some("jpeg")
                )
            })
            .collect();
        files.sort();
        if files.is_empty() {
            return Err(VisionError::CameraUnavailable(format!(
                "no images in {}",
                dir.display()
            )));
        }

        let (tx, rx) = bounded::<Frame>(4);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = std::thread::Builder::new()
            .name("vav-preread".into())
            .spawn(move || {
                // Loop over the sequence until told to stop.
                'outer: loop {
                    for path in &files {
                        if stop_flag.load(Ordering::Relaxed) {
                            break 'outer;
                        }
                        let frame = match decode_bgr(path) {
                            Ok(f) => f,
                            Err(e) => {
                                log::warn!("skipping {}: {e}", path.display());
                                continue;
                            }
                        };
                        // Blocks when the consumer is behind; that is the
                        // pre-read backpressure, not a failure.
                        if tx.send(frame).is_err() {
                            break 'outer;
                        }
                    }
                }
            })
            .map_err(|e| VisionError::CameraUnavailable(e.to_string()))?;

        Ok(Self {
            rx,
            stop,
            handle: Some(handle),
            dir: dir.to_path_buf(),
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn read_frame(&mut self) -> Option<Frame> {
        self.rx.recv_timeout(Duration::from_millis(200)).ok()
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.dir.display())
    }
}

impl Drop for ImageSequenceSource {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Drain so a blocked send wakes up and sees the stop flag.
        while self.rx.try_recv().is_ok() {}
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn decode_bgr(path: &Path) -> VisionResult<Frame> {
    let img = image::open(path)
        .map_err(|e| VisionError::Decode(e.to_string()))?
        .into_rgb8();
    let (width, height) = img.dimensions();
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for px in img.pixels() {
        data.push(px[2]);
        data.push(px[1]);
        data.push(px[0]);
    }
    Ok(Frame {
        width,
        height,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pattern_is_deterministic() {
        let mut a = TestPatternSource::new(160, 120);
        let mut b = TestPatternSource::new(160, 120);
        for _ in 0..10 {
            let fa = a.read_frame().unwrap();
            let fb = b.read_frame().unwrap();
            assert_eq!(fa.data, fb.data);
        }
    }

    #[test]
    fn test_pattern_moves() {
        let mut src = TestPatternSource::new(160, 120);
        let first = src.read_frame().unwrap();
        for _ in 0..30 {
            src.read_frame();
        }
        let later = src.read_frame().unwrap();
        assert_ne!(first.data, later.data);
    }

    #[test]
    fn empty_directory_is_unavailable() {
        let dir = std::env::temp_dir().join("vav-empty-seq-test");
        let _ = std::fs::create_dir_all(&dir);
        assert!(matches!(
            ImageSequenceSource::open(&dir),
            Err(VisionError::CameraUnavailable(_))
        ));
    }
}
