//! Atomic parameter store
//!
//! One `AtomicU32` (f32 bits) per `ParamId` plus a version counter.
//! Writers (GUI, MIDI, automation) are serialized by a short mutex that
//! readers never touch; readers copy the whole table into a plain
//! `ParamSnapshot` once per buffer / frame.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;
use vav_core::{ParamId, Sample, VavError, VavResult};

/// Lock-free readable parameter table.
pub struct ParameterStore {
    values: [AtomicU32; ParamId::COUNT],
    version: AtomicU64,
    /// Serializes writers; never taken on a read path.
    write_lock: Mutex<()>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore {
    /// Create a store populated with every parameter's default.
    pub fn new() -> Self {
        let values = std::array::from_fn(|i| {
            AtomicU32::new(vav_core::PARAM_SPECS[i].default.to_bits())
        });
        Self {
            values,
            version: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    /// Write one parameter. Out-of-range values clamp; NaN falls back to
    /// the default. Never fails, never panics.
    pub fn set(&self, id: ParamId, value: Sample) {
        let _guard = self.write_lock.lock();
        let clamped = id.spec().clamp(value);
        self.values[id.index()].store(clamped.to_bits(), Ordering::Relaxed);
        self.version.fetch_add(1, Ordering::Release);
    }

    /// Write a boolean parameter.
    pub fn set_bool(&self, id: ParamId, value: bool) {
        self.set(id, if value { 1.0 } else { 0.0 });
    }

    #[inline]
    pub fn get(&self, id: ParamId) -> Sample {
        Sample::from_bits(self.values[id.index()].load(Ordering::Relaxed))
    }

    #[inline]
    pub fn get_bool(&self, id: ParamId) -> bool {
        self.get(id) >= 0.5
    }

    /// Monotonic write counter. A consumer can skip re-deriving state when
    /// the version it last absorbed is unchanged.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Copy every parameter into a plain snapshot.
    pub fn snapshot(&self) -> ParamSnapshot {
        let version = self.version.load(Ordering::Acquire);
        let values =
            std::array::from_fn(|i| Sample::from_bits(self.values[i].load(Ordering::Relaxed)));
        ParamSnapshot { version, values }
    }

    /// Apply key/value pairs from a preset JSON object. Unknown keys are
    /// ignored (logged), values clamp as usual. Returns how many
    /// parameters were applied. A malformed document applies nothing.
    pub fn load_parameters(&self, json: &str) -> VavResult<usize> {
        let doc: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| VavError::Serialization(e.to_string()))?;
        let obj = doc
            .as_object()
            .ok_or_else(|| VavError::Serialization("preset root must be an object".into()))?;

        let mut applied = 0;
        for (key, value) in obj {
            let Some(id) = ParamId::from_key(key) else {
                log::debug!("preset: ignoring unknown key '{key}'");
                continue;
            };
            let Some(v) = value.as_f64() else {
                log::warn!("preset: key '{key}' is not a number, skipped");
                continue;
            };
            self.set(id, v as Sample);
            applied += 1;
        }
        Ok(applied)
    }

    /// Serialize the current values as a flat key→value JSON object.
    pub fn save_parameters(&self) -> String {
        let mut map = serde_json::Map::new();
        for id in ParamId::all() {
            map.insert(
                id.key().to_string(),
                serde_json::Value::from(self.get(id) as f64),
            );
        }
        serde_json::Value::Object(map).to_string()
    }
}

/// Plain copy of the parameter table, taken once per audio buffer or
/// render frame.
#[derive(Clone)]
pub struct ParamSnapshot {
    pub version: u64,
    values: [Sample; ParamId::COUNT],
}

impl ParamSnapshot {
    #[inline]
    pub fn get(&self, id: ParamId) -> Sample {
        self.values[id.index()]
    }

    #[inline]
    pub fn get_bool(&self, id: ParamId) -> bool {
        self.get(id) >= 0.5
    }
}

impl Default for ParamSnapshot {
    fn default() -> Self {
        ParameterStore::new().snapshot()
    }
}
