//! vav-engine: Orchestration of the VAV instrument
//!
//! One owned `Engine` wires the parameter store, the CV bus, the audio
//! stream, the vision thread, and the renderer into a one-way dataflow:
//!
//! ```text
//! camera ─► vision thread ─► CvBus ─┬─► audio callback ─► 7ch out
//!                                   └─► renderer ─► RGB frames
//! GUI/MIDI ─► ParameterStore ─► (everything reads snapshots)
//! ```
//!
//! There are no process-wide globals and no cycles: the engine owns the
//! DSP, the renderer borrows read-only snapshots, the host holds a handle
//! to the engine.

mod automation;
mod engine;
mod error;
mod midi;
mod preset;
mod vision_loop;

pub use automation::{AutomationLane, AutomationPlayer, AutomationPoint, CurveType, ParamIdKey};
pub use engine::{Engine, EngineConfig, EngineEvent};
pub use error::{EngineError, EngineResult};
pub use midi::{CcMapping, MidiMap, MidiRouter, NoteMapping, connect_midi};
pub use preset::{PresetFile, load_preset, save_preset};
