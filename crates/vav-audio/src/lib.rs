//! vav-audio: Realtime audio I/O for VAV
//!
//! Wraps cpal with the 4-in / 7-out stream geometry (stereo audio plus
//! five DC-coupled CV channels), runs the Alien4 engine inside the output
//! callback, and publishes meters and rolling input windows for the GUI
//! and renderer.
//!
//! CRITICAL: the output callback never blocks. Input arrives through a
//! wait-free ring from the input stream; parameters and CVs are absorbed
//! as atomic snapshots once per buffer.

mod device;
mod engine;
mod error;
mod recorder;
mod stream;
mod thread_priority;

pub use device::{
    default_input_device, default_output_device, input_device_by_name, list_input_devices,
    list_output_devices, output_device_by_name,
};
pub use engine::{EngineCore, MeterData, TriggerCounters};
pub use error::{AudioError, AudioResult};
pub use recorder::{OutputRecorder, RecordTap, RecorderConfig};
pub use stream::{AudioConfig, AudioStream};
pub use thread_priority::{PriorityResult, set_realtime_priority};
