//! vav-bus: Cross-thread communication for VAV
//!
//! Everything the threads share goes through this crate:
//! - `ParameterStore` — atomic parameter table written by GUI/MIDI,
//!   snapshot-read by audio, vision, and render
//! - `CvBus` — tear-free 5-slot CV snapshot written by the vision thread
//! - `TriggerQueue` — bounded SPSC envelope-trigger events
//! - `WindowBuffer` — wait-free rolling audio window for the renderer
//!
//! CRITICAL: nothing in this crate blocks the audio thread. Readers take
//! atomic snapshots; the only lock is the parameter store's write-side
//! serialization, which no reader ever touches.

mod cv;
mod store;
mod triggers;
mod window;

pub use cv::{CvBus, CvFrame, CvSlot};
pub use store::{ParamSnapshot, ParameterStore};
pub use triggers::{Trigger, TriggerKind, TriggerQueue, TriggerRx, TriggerTx};
pub use window::WindowBuffer;
