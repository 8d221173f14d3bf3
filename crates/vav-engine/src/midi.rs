//! MIDI mapping and routing
//!
//! Mapping file shape:
//! ```json
//! {
//!   "cc_mappings":   { "scan": { "channel": 0, "cc": 21 } },
//!   "note_mappings": { "record": { "channel": 0, "note": 36 } }
//! }
//! ```
//! CC values map linearly onto the parameter's range. Notes drive button
//! parameters: note-on toggles, velocity-zero note-on counts as note-off,
//! and toggles debounce at 200 ms. Conflicting writes resolve last-wins
//! through the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use midir::{MidiInput, MidiInputConnection};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use vav_bus::ParameterStore;
use vav_core::ParamId;

use crate::{EngineError, EngineResult};

const BUTTON_DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CcMapping {
    pub channel: u8,
    pub cc: u8,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct NoteMapping {
    pub channel: u8,
    pub note: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MidiMap {
    #[serde(default)]
    pub cc_mappings: HashMap<String, CcMapping>,
    #[serde(default)]
    pub note_mappings: HashMap<String, NoteMapping>,
}

impl MidiMap {
    pub fn from_json(json: &str) -> EngineResult<Self> {
        serde_json::from_str(json).map_err(|e| EngineError::Serialization(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".into())
    }
}

/// Routes raw MIDI bytes into parameter writes.
pub struct MidiRouter {
    map: MidiMap,
    store: Arc<ParameterStore>,
    last_button: HashMap<ParamId, Instant>,
}

impl MidiRouter {
    pub fn new(map: MidiMap, store: Arc<ParameterStore>) -> Self {
        Self {
            map,
            store,
            last_button: HashMap::new(),
        }
    }

    pub fn set_map(&mut self, map: MidiMap) {
        self.map = map;
    }

    pub fn map(&self) -> &MidiMap {
        &self.map
    }

    /// Handle one raw MIDI message.
    pub fn handle_message(&mut self, data: &[u8]) {
        if data.len() < 3 {
            return;
        }
        let status = data[0] & 0xF0;
        let channel = data[0] & 0x0F;
        match status {
            0xB0 => self.handle_cc(channel, data[1], data[2]),
            0x90 => {
                // Velocity-zero note-on is note-off.
                if data[2] > 0 {
                    self.handle_note_on(channel, data[1]);
                }
            }
            0x80 => {}
            _ => {}
        }
    }

    fn handle_cc(&mut self, channel: u8, cc: u8, value: u8) {
        for (key, mapping) in &self.map.cc_mappings {
            if mapping.channel != channel || mapping.cc != cc {
                continue;
            }
            let Some(id) = ParamId::from_key(key) else {
                log::warn!("MIDI map references unknown parameter '{key}'");
                continue;
            };
            let spec = id.spec();
            let scaled = spec.min + (value as f32 / 127.0) * (spec.max - spec.min);
            self.store.set(id, scaled);
        }
    }

    fn handle_note_on(&mut self, channel: u8, note: u8) {
        let now = Instant::now();
        for (key, mapping) in &self.map.note_mappings {
            if mapping.channel != channel || mapping.note != note {
                continue;
            }
            let Some(id) = ParamId::from_key(key) else {
                log::warn!("MIDI map references unknown parameter '{key}'");
                continue;
            };
            if let Some(last) = self.last_button.get(&id) {
                if now.duration_since(*last) < BUTTON_DEBOUNCE {
                    continue;
                }
            }
            self.last_button.insert(id, now);
            let toggled = !self.store.get_bool(id);
            self.store.set_bool(id, toggled);
        }
    }
}

/// Open the first MIDI input port whose name contains `port_hint` (or the
/// first port when no hint is given) and feed it into the router.
pub fn connect_midi(
    port_hint: Option<&str>,
    router: Arc<Mutex<MidiRouter>>,
) -> EngineResult<MidiInputConnection<()>> {
    let input = MidiInput::new("vav").map_err(|e| EngineError::Midi(e.to_string()))?;
    let ports = input.ports();
    let port = ports
        .iter()
        .find(|p| match port_hint {
            Some(hint) => input
                .port_name(p)
                .map(|n| n.contains(hint))
                .unwrap_or(false),
            None => true,
        })
        .ok_or_else(|| EngineError::Midi("no matching MIDI input port".into()))?;

    let name = input.port_name(port).unwrap_or_else(|_| "unknown".into());
    log::info!("MIDI input connected: {name}");

    input
        .connect(
            port,
            "vav-in",
            move |_timestamp, message, _| {
                router.lock().handle_message(message);
            },
            (),
        )
        .map_err(|e| EngineError::Midi(e.to_string()))
}
