//! Preset persistence
//!
//! A preset is a JSON document with a flat `parameters` object plus an
//! optional MIDI map. Contents are purely additive: loading applies the
//! keys it knows and leaves everything else at its last-known-good value.
//! A malformed file changes nothing.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use vav_bus::ParameterStore;
use vav_core::ParamId;

use crate::midi::MidiMap;
use crate::{EngineError, EngineResult};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PresetFile {
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midi: Option<MidiMap>,
}

impl PresetFile {
    pub fn capture(store: &ParameterStore, midi: Option<MidiMap>) -> Self {
        let parameters = ParamId::all()
            .map(|id| (id.key().to_string(), store.get(id) as f64))
            .collect();
        Self { parameters, midi }
    }

    /// Apply to the store; returns how many parameters were written.
    pub fn apply(&self, store: &ParameterStore) -> usize {
        let mut applied = 0;
        for (key, value) in &self.parameters {
            if let Some(id) = ParamId::from_key(key) {
                store.set(id, *value as f32);
                applied += 1;
            } else {
                log::debug!("preset: ignoring unknown key '{key}'");
            }
        }
        applied
    }
}

/// Load a preset file. On any parse or IO error the store is untouched.
pub fn load_preset(path: &Path, store: &ParameterStore) -> EngineResult<PresetFile> {
    let text = std::fs::read_to_string(path)?;
    let preset: PresetFile =
        serde_json::from_str(&text).map_err(|e| EngineError::Serialization(e.to_string()))?;
    let applied = preset.apply(store);
    log::info!("preset {} applied ({applied} parameters)", path.display());
    Ok(preset)
}

pub fn save_preset(
    path: &Path,
    store: &ParameterStore,
    midi: Option<MidiMap>,
) -> EngineResult<()> {
    let preset = PresetFile::capture(store, midi);
    let json = serde_json::to_string_pretty(&preset)
        .map_err(|e| EngineError::Serialization(e.to_string()))?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_apply_round_trip() {
        let store = ParameterStore::new();
        store.set(ParamId::ReverbMix, 0.42);
        store.set(ParamId::ScanTime, 12.0);
        let preset = PresetFile::capture(&store, None);

        let fresh = ParameterStore::new();
        let applied = preset.apply(&fresh);
        assert_eq!(applied, ParamId::COUNT);
        assert!((fresh.get(ParamId::ReverbMix) - 0.42).abs() < 1e-6);
        assert!((fresh.get(ParamId::ScanTime) - 12.0).abs() < 1e-5);
    }

    #[test]
    fn file_round_trip() {
        let dir = std::env::temp_dir().join("vav-preset-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("take1.json");

        let store = ParameterStore::new();
        store.set(ParamId::GrainDensity, 0.9);
        save_preset(&path, &store, None).unwrap();

        let fresh = ParameterStore::new();
        load_preset(&path, &fresh).unwrap();
        assert!((fresh.get(ParamId::GrainDensity) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn malformed_file_leaves_store_untouched() {
        let dir = std::env::temp_dir().join("vav-preset-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = ParameterStore::new();
        store.set(ParamId::Mix, 0.77);
        assert!(load_preset(&path, &store).is_err());
        assert!((store.get(ParamId::Mix) - 0.77).abs() < 1e-6);
    }

    #[test]
    fn preset_with_midi_map_survives() {
        let mut midi = MidiMap::default();
        midi.cc_mappings.insert(
            "scan".into(),
            crate::midi::CcMapping { channel: 0, cc: 7 },
        );
        let store = ParameterStore::new();
        let preset = PresetFile::capture(&store, Some(midi));
        let json = serde_json::to_string(&preset).unwrap();
        let parsed: PresetFile = serde_json::from_str(&json).unwrap();
        assert!(parsed.midi.is_some());
        assert_eq!(parsed.midi.unwrap().cc_mappings["scan"].cc, 7);
    }
}
