//! Rolling audio window for the renderer
//!
//! The audio callback appends each input block; the render thread copies
//! the most recent N samples. The ring is at least twice the window, so a
//! reader working behind the write cursor never overlaps the region the
//! writer is touching. Per-slot atomic stores keep the copy free of torn
//! floats without any lock.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use vav_core::Sample;

/// Wait-free single-writer rolling window.
#[repr(align(64))]
pub struct WindowBuffer {
    buf: Box<[AtomicU32]>,
    mask: usize,
    write_pos: AtomicUsize,
}

impl WindowBuffer {
    /// `window` is the largest read the consumer will make; capacity is
    /// rounded up to a power of two at least twice that.
    pub fn new(window: usize) -> Self {
        let capacity = (window * 2).next_power_of_two();
        let buf = (0..capacity)
            .map(|_| AtomicU32::new(0.0f32.to_bits()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            buf,
            mask: capacity - 1,
            write_pos: AtomicUsize::new(0),
        }
    }

    /// Append a block (audio thread).
    pub fn push(&self, samples: &[Sample]) {
        let start = self.write_pos.load(Ordering::Relaxed);
        for (i, &s) in samples.iter().enumerate() {
            self.buf[(start + i) & self.mask].store(s.to_bits(), Ordering::Relaxed);
        }
        self.write_pos
            .store(start.wrapping_add(samples.len()), Ordering::Release);
    }

    /// Copy the most recent `out.len()` samples, oldest first. Positions
    /// not yet written read as 0.0.
    pub fn copy_latest(&self, out: &mut [Sample]) {
        debug_assert!(out.len() * 2 <= self.buf.len());
        let end = self.write_pos.load(Ordering::Acquire);
        let n = out.len();
        for (i, o) in out.iter_mut().enumerate() {
            let age = n - i;
            *o = if end >= age {
                Sample::from_bits(self.buf[(end - age) & self.mask].load(Ordering::Relaxed))
            } else {
                0.0
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_window_is_most_recent() {
        let ring = WindowBuffer::new(8);
        ring.push(&[1.0, 2.0, 3.0, 4.0]);
        ring.push(&[5.0, 6.0]);
        let mut out = [0.0; 4];
        ring.copy_latest(&mut out);
        assert_eq!(out, [3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn unwritten_positions_are_silent() {
        let ring = WindowBuffer::new(8);
        ring.push(&[1.0, 2.0]);
        let mut out = [9.0; 6];
        ring.copy_latest(&mut out);
        assert_eq!(out, [0.0, 0.0, 0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn wraps_around_capacity() {
        let ring = WindowBuffer::new(4); // capacity 8
        for block in 0..10 {
            let base = block as f32 * 4.0;
            ring.push(&[base, base + 1.0, base + 2.0, base + 3.0]);
        }
        let mut out = [0.0; 4];
        ring.copy_latest(&mut out);
        assert_eq!(out, [36.0, 37.0, 38.0, 39.0]);
    }
}
