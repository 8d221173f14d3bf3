//! Parameter automation
//!
//! Time-based automation lanes writing into the parameter store from the
//! control side. Each lane holds sorted breakpoints with a curve type to
//! the next point; the player advances a clock (optionally looping) and
//! pushes interpolated values through the same write path the GUI and
//! MIDI use, so the audio thread absorbs them at its next buffer.

use serde::{Deserialize, Serialize};

use vav_bus::ParameterStore;
use vav_core::{ParamId, Sample};

/// Automation curve interpolation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CurveType {
    /// Linear interpolation (constant rate of change)
    #[default]
    Linear,
    /// Exponential curve (slow start, fast end)
    Exponential,
    /// Logarithmic curve (fast start, slow end)
    Logarithmic,
    /// S-curve (slow start and end, fast middle)
    SCurve,
    /// Instant change at the next point
    Step,
    /// Maintain value until the next point
    Hold,
}

impl CurveType {
    /// Interpolate between two values; `t` is the normalized position.
    #[inline]
    pub fn interpolate(self, start: Sample, end: Sample, t: Sample) -> Sample {
        let t = t.clamp(0.0, 1.0);
        let shaped = match self {
            CurveType::Linear => t,
            CurveType::Exponential => t * t,
            CurveType::Logarithmic => t.sqrt(),
            CurveType::SCurve => t * t * (3.0 - 2.0 * t),
            CurveType::Step => {
                if t >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
            CurveType::Hold => 0.0,
        };
        start + (end - start) * shaped
    }
}

/// Single breakpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AutomationPoint {
    /// Seconds from lane start.
    pub time: Sample,
    pub value: Sample,
    /// Curve toward the next point.
    pub curve: CurveType,
}

/// One parameter's automation timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomationLane {
    pub param: ParamIdKey,
    points: Vec<AutomationPoint>,
}

/// Serializable parameter reference by key name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamIdKey(pub String);

impl ParamIdKey {
    pub fn resolve(&self) -> Option<ParamId> {
        ParamId::from_key(&self.0)
    }
}

impl AutomationLane {
    pub fn new(param: ParamId) -> Self {
        Self {
            param: ParamIdKey(param.key().to_string()),
            points: Vec::new(),
        }
    }

    /// Insert a breakpoint, keeping the list time-sorted.
    pub fn add_point(&mut self, point: AutomationPoint) {
        let idx = self
            .points
            .partition_point(|p| p.time <= point.time);
        self.points.insert(idx, point);
    }

    pub fn clear(&mut self) {
        self.points.clear();
    }

    pub fn points(&self) -> &[AutomationPoint] {
        &self.points
    }

    /// Lane duration: the last breakpoint's time.
    pub fn length(&self) -> Sample {
        self.points.last().map(|p| p.time).unwrap_or(0.0)
    }

    /// Interpolated value at `time`, or `None` for an empty lane.
    pub fn value_at(&self, time: Sample) -> Option<Sample> {
        let first = self.points.first()?;
        if time <= first.time {
            return Some(first.value);
        }
        let last = self.points.last()?;
        if time >= last.time {
            return Some(last.value);
        }
        // Find the segment containing `time`.
        let after = self.points.partition_point(|p| p.time <= time);
        let a = self.points[after - 1];
        let b = self.points[after];
        let span = (b.time - a.time).max(1e-6);
        let t = (time - a.time) / span;
        Some(a.curve.interpolate(a.value, b.value, t))
    }
}

/// Drives a set of lanes against the wall clock and writes the results
/// into the store.
pub struct AutomationPlayer {
    lanes: Vec<AutomationLane>,
    clock: Sample,
    looped: bool,
    playing: bool,
}

impl AutomationPlayer {
    pub fn new(looped: bool) -> Self {
        Self {
            lanes: Vec::new(),
            clock: 0.0,
            looped,
            playing: false,
        }
    }

    pub fn add_lane(&mut self, lane: AutomationLane) {
        self.lanes.push(lane);
    }

    pub fn lanes(&self) -> &[AutomationLane] {
        &self.lanes
    }

    pub fn play(&mut self) {
        self.playing = true;
    }

    pub fn stop(&mut self) {
        self.playing = false;
    }

    pub fn rewind(&mut self) {
        self.clock = 0.0;
    }

    pub fn clock(&self) -> Sample {
        self.clock
    }

    /// Advance by `dt` seconds and apply every lane's current value.
    pub fn advance(&mut self, dt: Sample, store: &ParameterStore) {
        if !self.playing {
            return;
        }
        self.clock += dt;

        let total: Sample = self
            .lanes
            .iter()
            .map(|l| l.length())
            .fold(0.0, Sample::max);
        if self.looped && total > 0.0 && self.clock > total {
            self.clock %= total;
        }

        for lane in &self.lanes {
            let Some(id) = lane.param.resolve() else {
                continue;
            };
            if let Some(value) = lane.value_at(self.clock) {
                store.set(id, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_lane(param: ParamId) -> AutomationLane {
        let mut lane = AutomationLane::new(param);
        lane.add_point(AutomationPoint {
            time: 0.0,
            value: 0.0,
            curve: CurveType::Linear,
        });
        lane.add_point(AutomationPoint {
            time: 2.0,
            value: 1.0,
            curve: CurveType::Linear,
        });
        lane
    }

    #[test]
    fn linear_segment_interpolates() {
        let lane = ramp_lane(ParamId::Mix);
        assert_eq!(lane.value_at(0.0), Some(0.0));
        assert!((lane.value_at(1.0).unwrap() - 0.5).abs() < 1e-6);
        assert_eq!(lane.value_at(5.0), Some(1.0));
    }

    #[test]
    fn points_stay_sorted() {
        let mut lane = AutomationLane::new(ParamId::Scan);
        for &t in &[3.0, 1.0, 2.0, 0.5] {
            lane.add_point(AutomationPoint {
                time: t,
                value: t,
                curve: CurveType::Linear,
            });
        }
        let times: Vec<f32> = lane.points().iter().map(|p| p.time).collect();
        assert_eq!(times, vec![0.5, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn hold_keeps_start_value() {
        let mut lane = AutomationLane::new(ParamId::Mix);
        lane.add_point(AutomationPoint {
            time: 0.0,
            value: 0.3,
            curve: CurveType::Hold,
        });
        lane.add_point(AutomationPoint {
            time: 1.0,
            value: 0.9,
            curve: CurveType::Linear,
        });
        assert!((lane.value_at(0.99).unwrap() - 0.3).abs() < 1e-6);
        assert_eq!(lane.value_at(1.0), Some(0.9));
    }

    #[test]
    fn player_writes_into_store() {
        let store = ParameterStore::new();
        let mut player = AutomationPlayer::new(false);
        player.add_lane(ramp_lane(ParamId::Mix));
        player.play();

        player.advance(1.0, &store);
        assert!((store.get(ParamId::Mix) - 0.5).abs() < 1e-5);
        player.advance(1.0, &store);
        assert!((store.get(ParamId::Mix) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn looped_player_wraps_its_clock() {
        let store = ParameterStore::new();
        let mut player = AutomationPlayer::new(true);
        player.add_lane(ramp_lane(ParamId::Mix));
        player.play();

        player.advance(2.5, &store);
        assert!((player.clock() - 0.5).abs() < 1e-5);
        assert!((store.get(ParamId::Mix) - 0.25).abs() < 1e-5);
    }

    #[test]
    fn stopped_player_is_inert() {
        let store = ParameterStore::new();
        let mut player = AutomationPlayer::new(false);
        player.add_lane(ramp_lane(ParamId::Mix));
        player.advance(1.0, &store);
        assert_eq!(store.get(ParamId::Mix), ParamId::Mix.spec().default);
    }
}
