//! Tear-free CV snapshot bus
//!
//! Five float slots (ENV1, ENV2, ENV3, SEQ1, SEQ2) written by the vision
//! thread at camera rate and read by the audio callback, the renderer, and
//! the GUI. Publication is a seqlock: the writer bumps the sequence to an
//! odd value, stores the slots, then bumps it even again; readers retry if
//! the sequence moved under them. Readers never block the writer and the
//! writer never waits for readers.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use vav_core::{CV_SLOTS, Sample, clamp_cv};

/// CV slot indices on the 5-channel bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum CvSlot {
    Env1 = 0,
    Env2 = 1,
    Env3 = 2,
    Seq1 = 3,
    Seq2 = 4,
}

/// One coherent reading of the bus.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CvFrame {
    pub volts: [Sample; CV_SLOTS],
}

impl CvFrame {
    #[inline]
    pub fn get(&self, slot: CvSlot) -> Sample {
        self.volts[slot as usize]
    }
}

/// Single-writer multi-reader CV bus.
#[repr(align(64))]
pub struct CvBus {
    seq: AtomicU32,
    slots: [AtomicU32; CV_SLOTS],
    muted: [AtomicBool; CV_SLOTS],
}

impl Default for CvBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CvBus {
    pub fn new() -> Self {
        Self {
            seq: AtomicU32::new(0),
            slots: std::array::from_fn(|_| AtomicU32::new(0.0f32.to_bits())),
            muted: std::array::from_fn(|_| AtomicBool::new(false)),
        }
    }

    /// Publish a new CV frame (vision thread only).
    ///
    /// Values clamp to 0–10 V; muted channels are stored as exactly 0.0.
    pub fn write(&self, volts: &[Sample; CV_SLOTS]) {
        self.seq.fetch_add(1, Ordering::Release);
        for (i, &v) in volts.iter().enumerate() {
            let v = if self.muted[i].load(Ordering::Relaxed) {
                0.0
            } else {
                clamp_cv(v)
            };
            self.slots[i].store(v.to_bits(), Ordering::Relaxed);
        }
        self.seq.fetch_add(1, Ordering::Release);
    }

    /// Read a coherent frame. Retries while a write is in flight; with a
    /// ≤120 Hz writer this converges on the first or second attempt.
    /// Muted channels read as exactly 0.0 even if a stale nonzero value is
    /// still stored.
    pub fn read(&self) -> CvFrame {
        loop {
            let s1 = self.seq.load(Ordering::Acquire);
            if s1 & 1 != 0 {
                std::hint::spin_loop();
                continue;
            }
            let mut volts = [0.0; CV_SLOTS];
            for (i, v) in volts.iter_mut().enumerate() {
                *v = Sample::from_bits(self.slots[i].load(Ordering::Relaxed));
            }
            let s2 = self.seq.load(Ordering::Acquire);
            if s1 == s2 {
                for (i, v) in volts.iter_mut().enumerate() {
                    if self.muted[i].load(Ordering::Relaxed) {
                        *v = 0.0;
                    }
                }
                return CvFrame { volts };
            }
        }
    }

    /// Mute or unmute one channel (GUI thread). The sequence lock is the
    /// writer's alone; mute is a plain flag that `read` applies after its
    /// coherent copy, so a muted channel reads 0.0 from this call on even
    /// if the stored value is stale.
    pub fn set_muted(&self, slot: CvSlot, muted: bool) {
        self.muted[slot as usize].store(muted, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_muted(&self, slot: CvSlot) -> bool {
        self.muted[slot as usize].load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_read_round_trip() {
        let bus = CvBus::new();
        bus.write(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let frame = bus.read();
        assert_eq!(frame.volts, [1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(frame.get(CvSlot::Seq1), 4.0);
    }

    #[test]
    fn values_clamp_to_cv_range() {
        let bus = CvBus::new();
        bus.write(&[-5.0, 15.0, 10.0, 0.0, 9.99]);
        let frame = bus.read();
        assert_eq!(frame.volts[0], 0.0);
        assert_eq!(frame.volts[1], 10.0);
    }

    #[test]
    fn muted_channel_reads_exact_zero() {
        let bus = CvBus::new();
        bus.write(&[5.0; CV_SLOTS]);
        bus.set_muted(CvSlot::Env2, true);
        let frame = bus.read();
        assert_eq!(frame.get(CvSlot::Env2), 0.0);
        assert_eq!(frame.get(CvSlot::Env1), 5.0);

        // Writes while muted stay zero.
        bus.write(&[7.0; CV_SLOTS]);
        assert_eq!(bus.read().get(CvSlot::Env2), 0.0);

        bus.set_muted(CvSlot::Env2, false);
        bus.write(&[7.0; CV_SLOTS]);
        assert_eq!(bus.read().get(CvSlot::Env2), 7.0);
    }
}
