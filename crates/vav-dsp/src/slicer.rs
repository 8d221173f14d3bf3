//! Loop recording and onset-based slice detection
//!
//! Recording writes into a temp buffer while onsets are tracked live; on
//! stop the temp buffer becomes the loop and the last slice is finalized.
//! Changing MIN_SLICE_TIME while stopped rescans the whole loop with the
//! same onset rule. Both paths produce identical slice lists for identical
//! audio, so a repeated rescan is a no-op.
//!
//! All buffers are allocated at construction; the slice list has fixed
//! capacity and never grows on the audio path.

use vav_core::{Sample, min_slice_seconds};

/// Loop length: 60 s at 48 kHz.
pub const LOOP_BUF_LEN: usize = 2_880_000;

/// Onset threshold on |x|, fixed.
const ONSET_THRESHOLD: Sample = 0.5;

/// Slice list capacity.
pub const MAX_SLICES: usize = 4096;

/// A contiguous onset region `[start, end)` of the loop buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Slice {
    pub start: i32,
    pub end: i32,
    pub peak_amplitude: Sample,
    pub active: bool,
}

impl Slice {
    #[inline]
    pub fn len(&self) -> i32 {
        self.end - self.start
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

pub struct LoopSlicer {
    loop_buf: Vec<Sample>,
    temp_buf: Vec<Sample>,
    recorded_len: usize,
    temp_len: usize,
    slices: Vec<Slice>,
    pending: Vec<Slice>,

    recording: bool,
    prev_abs: Sample,
    open_start: i32,
    open_peak: Sample,

    min_slice_samples: usize,
    last_min_slice_secs: Sample,
    sample_rate: Sample,
}

impl LoopSlicer {
    pub fn new(sample_rate: Sample) -> Self {
        let default_secs = min_slice_seconds(0.3);
        Self {
            loop_buf: vec![0.0; LOOP_BUF_LEN],
            temp_buf: vec![0.0; LOOP_BUF_LEN],
            recorded_len: 0,
            temp_len: 0,
            slices: Vec::with_capacity(MAX_SLICES),
            pending: Vec::with_capacity(MAX_SLICES),
            recording: false,
            prev_abs: 0.0,
            open_start: -1,
            open_peak: 0.0,
            min_slice_samples: (default_secs * sample_rate) as usize,
            last_min_slice_secs: default_secs,
            sample_rate,
        }
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    #[inline]
    pub fn recorded_len(&self) -> usize {
        self.recorded_len
    }

    #[inline]
    pub fn loop_buf(&self) -> &[Sample] {
        &self.loop_buf[..self.recorded_len]
    }

    #[inline]
    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    #[inline]
    pub fn num_slices(&self) -> usize {
        self.slices.len()
    }

    #[inline]
    pub fn has_loop(&self) -> bool {
        self.recorded_len > 0
    }

    /// Toggle recording. Returns true when a stop finalized a new loop
    /// (the slice list was invalidated and voices must be re-seated).
    pub fn set_recording(&mut self, on: bool) -> bool {
        if on == self.recording {
            return false;
        }
        self.recording = on;
        if on {
            self.temp_len = 0;
            self.prev_abs = 0.0;
            self.open_start = -1;
            self.open_peak = 0.0;
            self.pending.clear();
            false
        } else {
            self.finalize_recording();
            true
        }
    }

    /// Feed one input sample while recording.
    #[inline(always)]
    pub fn record_sample(&mut self, x: Sample) {
        if !self.recording || self.temp_len >= LOOP_BUF_LEN {
            return;
        }
        let a = x.abs();
        if self.prev_abs < ONSET_THRESHOLD && a >= ONSET_THRESHOLD {
            let n = self.temp_len as i32;
            self.close_open(n, true);
            self.open_start = n;
            self.open_peak = a;
        } else if self.open_start >= 0 && a > self.open_peak {
            self.open_peak = a;
        }
        self.prev_abs = a;
        self.temp_buf[self.temp_len] = x;
        self.temp_len += 1;
    }

    fn finalize_recording(&mut self) {
        self.loop_buf[..self.temp_len].copy_from_slice(&self.temp_buf[..self.temp_len]);
        self.recorded_len = self.temp_len;
        if self.recorded_len > 0 {
            self.close_open(self.recorded_len as i32 - 1, true);
        }
        std::mem::swap(&mut self.slices, &mut self.pending);
        self.pending.clear();
    }

    fn close_open(&mut self, end: i32, into_pending: bool) {
        if self.open_start < 0 {
            return;
        }
        let len = end - self.open_start;
        if len >= self.min_slice_samples as i32 {
            let slice = Slice {
                start: self.open_start,
                end,
                peak_amplitude: self.open_peak,
                active: true,
            };
            let list = if into_pending {
                &mut self.pending
            } else {
                &mut self.slices
            };
            if list.len() < MAX_SLICES {
                list.push(slice);
            }
        }
        self.open_start = -1;
        self.open_peak = 0.0;
    }

    /// Absorb the MIN_SLICE_TIME knob. Returns true when the change forced
    /// a rescan (knob drift > 1 ms while stopped with a loop present).
    pub fn set_min_slice_time(&mut self, knob: Sample) -> bool {
        let secs = min_slice_seconds(knob);
        if (secs - self.last_min_slice_secs).abs() <= 0.001 {
            return false;
        }
        self.last_min_slice_secs = secs;
        self.min_slice_samples = (secs * self.sample_rate) as usize;
        if !self.recording && self.has_loop() {
            self.rescan();
            true
        } else {
            false
        }
    }

    /// Rebuild the slice list from the recorded loop with the current
    /// minimum length. Runs at most once per buffer, from the pre-process
    /// block, never inside the sample loop.
    pub fn rescan(&mut self) {
        self.slices.clear();
        self.open_start = -1;
        self.open_peak = 0.0;
        let mut prev_abs = 0.0;
        for n in 0..self.recorded_len {
            let a = self.loop_buf[n].abs();
            if prev_abs < ONSET_THRESHOLD && a >= ONSET_THRESHOLD {
                self.close_open(n as i32, false);
                self.open_start = n as i32;
                self.open_peak = a;
            } else if self.open_start >= 0 && a > self.open_peak {
                self.open_peak = a;
            }
            prev_abs = a;
        }
        if self.recorded_len > 0 {
            self.close_open(self.recorded_len as i32 - 1, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Record a buffer with clicks at the given sample offsets.
    fn record_clicks(slicer: &mut LoopSlicer, total: usize, clicks: &[usize]) {
        slicer.set_recording(true);
        for n in 0..total {
            let in_click = clicks.iter().any(|&c| n >= c && n < c + 100);
            slicer.record_sample(if in_click { 0.8 } else { 0.0 });
        }
        slicer.set_recording(false);
    }

    #[test]
    fn three_clicks_three_slices() {
        let mut slicer = LoopSlicer::new(48000.0);
        slicer.set_min_slice_time(0.3);
        record_clicks(&mut slicer, 96_000, &[9600, 38_400, 72_000]);

        assert_eq!(slicer.num_slices(), 3);
        let s = slicer.slices();
        assert!((9500..10_000).contains(&(s[0].start as usize)));
        assert!((38_000..38_500).contains(&(s[1].start as usize)));
        assert!((71_500..72_000).contains(&(s[2].start as usize)));
        for slice in s {
            assert!((slice.peak_amplitude - 0.8).abs() < 1e-6);
        }
    }

    #[test]
    fn slice_invariants_hold() {
        let mut slicer = LoopSlicer::new(48000.0);
        slicer.set_min_slice_time(0.1);
        record_clicks(&mut slicer, 48_000, &[1000, 10_000, 30_000]);

        let recorded = slicer.recorded_len() as i32;
        for s in slicer.slices() {
            assert!(0 <= s.start);
            assert!(s.start <= s.end);
            assert!(s.end < recorded);
        }
    }

    #[test]
    fn short_slices_are_dropped() {
        let mut slicer = LoopSlicer::new(48000.0);
        // Knob 0.5 -> 1 s minimum; clicks 0.5 s apart never qualify.
        slicer.set_min_slice_time(0.5);
        record_clicks(&mut slicer, 96_000, &[10_000, 34_000, 58_000]);
        // Only the final slice (58k..end, 0.79 s) also fails; none survive.
        assert_eq!(slicer.num_slices(), 0);
    }

    #[test]
    fn rescan_is_idempotent() {
        let mut slicer = LoopSlicer::new(48000.0);
        slicer.set_min_slice_time(0.3);
        record_clicks(&mut slicer, 96_000, &[9600, 38_400, 72_000]);

        let first: Vec<Slice> = slicer.slices().to_vec();
        // Same knob twice: no rescan, identical list.
        assert!(!slicer.set_min_slice_time(0.3));
        assert_eq!(slicer.slices(), &first[..]);

        // Forced rescan reproduces the live-detected list bit for bit.
        slicer.rescan();
        assert_eq!(slicer.slices(), &first[..]);
    }

    #[test]
    fn min_slice_change_triggers_rescan() {
        let mut slicer = LoopSlicer::new(48000.0);
        slicer.set_min_slice_time(0.3);
        record_clicks(&mut slicer, 96_000, &[9600, 38_400, 72_000]);
        assert_eq!(slicer.num_slices(), 3);

        // Raise the minimum above the inter-click spacing: slices vanish.
        assert!(slicer.set_min_slice_time(0.6));
        assert_eq!(slicer.num_slices(), 0);

        // And back down: they return.
        assert!(slicer.set_min_slice_time(0.3));
        assert_eq!(slicer.num_slices(), 3);
    }

    #[test]
    fn recording_silence_yields_no_slices() {
        let mut slicer = LoopSlicer::new(48000.0);
        slicer.set_recording(true);
        for _ in 0..48_000 {
            slicer.record_sample(0.0);
        }
        slicer.set_recording(false);
        assert_eq!(slicer.num_slices(), 0);
        assert_eq!(slicer.recorded_len(), 48_000);
    }
}
