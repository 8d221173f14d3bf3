//! Audio device lookup

use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

use crate::{AudioError, AudioResult};

pub fn default_output_device() -> AudioResult<Device> {
    cpal::default_host()
        .default_output_device()
        .ok_or_else(|| AudioError::DeviceNotFound("no default output device".into()))
}

pub fn default_input_device() -> Option<Device> {
    cpal::default_host().default_input_device()
}

pub fn output_device_by_name(name: &str) -> AudioResult<Device> {
    let host = cpal::default_host();
    let devices = host
        .output_devices()
        .map_err(|e| AudioError::BackendError(e.to_string()))?;
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(AudioError::DeviceNotFound(name.into()))
}

pub fn input_device_by_name(name: &str) -> AudioResult<Device> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| AudioError::BackendError(e.to_string()))?;
    for device in devices {
        if device.name().map(|n| n == name).unwrap_or(false) {
            return Ok(device);
        }
    }
    Err(AudioError::DeviceNotFound(name.into()))
}

pub fn list_output_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.output_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}

pub fn list_input_devices() -> Vec<String> {
    let host = cpal::default_host();
    host.input_devices()
        .map(|devices| devices.filter_map(|d| d.name().ok()).collect())
        .unwrap_or_default()
}
