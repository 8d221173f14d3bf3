//! Edge and contour extraction
//!
//! Grayscale conversion, Sobel gradient magnitude, frame differencing,
//! and external-contour extraction by Moore-neighbour border following.
//! All buffers are caller-owned and reused across frames.

use crate::Frame;

/// Edge magnitude above which a pixel belongs to a contour.
const EDGE_THRESHOLD: u8 = 64;

/// Safety bound on border following (no contour is longer than this).
const MAX_TRACE_STEPS: usize = 1 << 20;

/// One closed contour: ordered boundary points, pixel coordinates.
#[derive(Debug, Clone, Default)]
pub struct Contour {
    pub points: Vec<(i32, i32)>,
}

impl Contour {
    #[inline]
    pub fn perimeter(&self) -> usize {
        self.points.len()
    }

    /// Centroid in pixel coordinates.
    pub fn centroid(&self) -> (f32, f32) {
        if self.points.is_empty() {
            return (0.0, 0.0);
        }
        let (sx, sy) = self
            .points
            .iter()
            .fold((0i64, 0i64), |(ax, ay), &(x, y)| (ax + x as i64, ay + y as i64));
        let n = self.points.len() as f32;
        (sx as f32 / n, sy as f32 / n)
    }

    /// Curvature at every point from the ±2-neighbour turning angle,
    /// normalized to [0, 1].
    pub fn curvature(&self, out: &mut Vec<f32>) {
        out.clear();
        let n = self.points.len();
        if n < 5 {
            out.resize(n, 0.0);
            return;
        }
        for i in 0..n {
            let pm = self.points[(i + n - 2) % n];
            let p = self.points[i];
            let pp = self.points[(i + 2) % n];
            let v1 = ((p.0 - pm.0) as f32, (p.1 - pm.1) as f32);
            let v2 = ((pp.0 - p.0) as f32, (pp.1 - p.1) as f32);
            let cross = v1.0 * v2.1 - v1.1 * v2.0;
            let dot = v1.0 * v2.0 + v1.1 * v2.1;
            let angle = cross.atan2(dot).abs();
            out.push(angle / std::f32::consts::PI);
        }
    }
}

/// BGR frame to 8-bit luma. `out` is resized as needed.
pub fn grayscale(frame: &Frame, out: &mut Vec<u8>) {
    let n = (frame.width * frame.height) as usize;
    out.resize(n, 0);
    for (i, px) in frame.data.chunks_exact(3).enumerate() {
        // BT.601 luma, BGR order
        let y = 0.114 * px[0] as f32 + 0.587 * px[1] as f32 + 0.299 * px[2] as f32;
        out[i] = y as u8;
    }
}

/// Sobel gradient magnitude, 8-bit. Border pixels are zero.
pub fn sobel_magnitude(gray: &[u8], width: u32, height: u32, out: &mut Vec<u8>) {
    let w = width as usize;
    let h = height as usize;
    out.resize(w * h, 0);
    out.fill(0);
    if w < 3 || h < 3 {
        return;
    }
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let p = |dx: i32, dy: i32| -> i32 {
                gray[(y as i32 + dy) as usize * w + (x as i32 + dx) as usize] as i32
            };
            let gx = -p(-1, -1) - 2 * p(-1, 0) - p(-1, 1) + p(1, -1) + 2 * p(1, 0) + p(1, 1);
            let gy = -p(-1, -1) - 2 * p(0, -1) - p(1, -1) + p(-1, 1) + 2 * p(0, 1) + p(1, 1);
            out[y * w + x] = ((gx.abs() + gy.abs()) / 4).min(255) as u8;
        }
    }
}

/// Mean normalized luminance difference between two frames, in [0, 1].
pub fn mean_absdiff(a: &[u8], b: &[u8]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }
    let sum: u64 = a
        .iter()
        .zip(b)
        .map(|(&x, &y)| (x as i32 - y as i32).unsigned_abs() as u64)
        .sum();
    sum as f32 / (a.len() as f32 * 255.0)
}

/// Extract external contours of the thresholded edge image by
/// Moore-neighbour border following. `scratch` is a reusable visited map.
pub fn extract_contours(
    edges: &[u8],
    width: u32,
    height: u32,
    scratch: &mut Vec<bool>,
    out: &mut Vec<Contour>,
) {
    let w = width as usize;
    let h = height as usize;
    scratch.resize(w * h, false);
    scratch.fill(false);
    out.clear();

    let fg = |x: i32, y: i32| -> bool {
        x >= 0
            && y >= 0
            && (x as usize) < w
            && (y as usize) < h
            && edges[y as usize * w + x as usize] >= EDGE_THRESHOLD
    };

    for y in 0..h as i32 {
        for x in 0..w as i32 {
            // A fresh external boundary starts where a foreground pixel has
            // background to its left and has not been traced yet.
            if !fg(x, y) || fg(x - 1, y) || scratch[y as usize * w + x as usize] {
                continue;
            }
            let contour = trace_boundary((x, y), &fg, scratch, w);
            if contour.points.len() > 2 {
                out.push(contour);
            }
        }
    }
}

/// Moore-neighbour tracing with backtracking, clockwise.
fn trace_boundary(
    start: (i32, i32),
    fg: &dyn Fn(i32, i32) -> bool,
    visited: &mut [bool],
    w: usize,
) -> Contour {
    // 8-neighbourhood, clockwise starting west.
    const DIRS: [(i32, i32); 8] = [
        (-1, 0),
        (-1, -1),
        (0, -1),
        (1, -1),
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
    ];

    let mut contour = Contour::default();
    let mut current = start;
    // We entered `start` from its west background neighbour.
    let mut backtrack_dir = 0usize;

    for _ in 0..MAX_TRACE_STEPS {
        contour.points.push(current);
        visited[current.1 as usize * w + current.0 as usize] = true;

        // Search clockwise from the direction after the backtrack.
        let mut found = None;
        for step in 1..=8 {
            let dir = (backtrack_dir + step) % 8;
            let next = (current.0 + DIRS[dir].0, current.1 + DIRS[dir].1);
            if fg(next.0, next.1) {
                found = Some((next, dir));
                break;
            }
        }

        let Some((next, dir)) = found else {
            break; // isolated pixel
        };

        // The new backtrack points from `next` toward the last background
        // neighbour checked, which is the direction opposite of our
        // arrival rotated one step back.
        backtrack_dir = (dir + 4) % 8;

        if next == start && contour.points.len() > 2 {
            break;
        }
        current = next;
    }
    contour
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_rect(w: u32, h: u32, x0: u32, y0: u32, rw: u32, rh: u32) -> Frame {
        let mut f = Frame::new(w, h);
        for y in y0..(y0 + rh).min(h) {
            for x in x0..(x0 + rw).min(w) {
                f.set_bgr(x, y, 255, 255, 255);
            }
        }
        f
    }

    fn pipeline(frame: &Frame) -> Vec<Contour> {
        let mut gray = Vec::new();
        let mut edges = Vec::new();
        let mut scratch = Vec::new();
        let mut contours = Vec::new();
        grayscale(frame, &mut gray);
        sobel_magnitude(&gray, frame.width, frame.height, &mut edges);
        extract_contours(&edges, frame.width, frame.height, &mut scratch, &mut contours);
        contours
    }

    #[test]
    fn rectangle_produces_closed_contour() {
        let frame = frame_with_rect(160, 120, 40, 30, 60, 40);
        let contours = pipeline(&frame);
        assert!(!contours.is_empty());

        let biggest = contours.iter().max_by_key(|c| c.perimeter()).unwrap();
        // Edge band circumference ~ 2*(60+40) = 200, within a factor
        // accounting for the two-pixel Sobel response.
        assert!(biggest.perimeter() > 120, "got {}", biggest.perimeter());

        let (cx, cy) = biggest.centroid();
        assert!((cx - 70.0).abs() < 8.0, "centroid x {cx}");
        assert!((cy - 50.0).abs() < 8.0, "centroid y {cy}");
    }

    #[test]
    fn corners_have_higher_curvature_than_edges() {
        let frame = frame_with_rect(160, 120, 40, 30, 60, 40);
        let contours = pipeline(&frame);
        let biggest = contours.iter().max_by_key(|c| c.perimeter()).unwrap();

        let mut k = Vec::new();
        biggest.curvature(&mut k);
        let max_k = k.iter().cloned().fold(0.0f32, f32::max);
        let min_k = k.iter().cloned().fold(1.0f32, f32::min);
        assert!(max_k > 0.2, "no corner curvature found: {max_k}");
        assert!(min_k < 0.05, "straight runs should be flat: {min_k}");
    }

    #[test]
    fn blank_frame_has_no_contours() {
        let frame = Frame::new(160, 120);
        assert!(pipeline(&frame).is_empty());
    }

    #[test]
    fn absdiff_detects_scene_change() {
        let a = frame_with_rect(64, 64, 10, 10, 20, 20);
        let b = frame_with_rect(64, 64, 30, 30, 20, 20);
        let mut ga = Vec::new();
        let mut gb = Vec::new();
        grayscale(&a, &mut ga);
        grayscale(&b, &mut gb);
        assert_eq!(mean_absdiff(&ga, &ga), 0.0);
        assert!(mean_absdiff(&ga, &gb) > 0.05);
    }
}
