//! Output device enumeration and lookup

use crate::error::{AudioError, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use serde::{Deserialize, Serialize};

/// Information about an audio output device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioDeviceInfo {
    pub name: String,
    /// Is this the system default device?
    pub is_default: bool,
    /// Native sample rate (Hz)
    pub sample_rate: u32,
    pub channels: u16,
}

#[allow(deprecated)]
fn device_name(device: &cpal::Device) -> Option<String> {
    device.name().ok()
}

/// Enumerate output devices of the default host, default device first
pub fn list_devices() -> Result<Vec<AudioDeviceInfo>> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().as_ref().and_then(device_name);

    let mut devices: Vec<AudioDeviceInfo> = host
        .output_devices()?
        .filter_map(|device| {
            let name = device_name(&device)?;
            let config = device.default_output_config().ok()?;
            Some(AudioDeviceInfo {
                is_default: default_name.as_deref() == Some(name.as_str()),
                name,
                sample_rate: config.sample_rate(),
                channels: config.channels(),
            })
        })
        .collect();

    devices.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)));
    Ok(devices)
}

/// Find an output device by name, or the default when `name` is `None`
pub fn find_output_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        None => host
            .default_output_device()
            .ok_or_else(|| AudioError::device("default output device not found")),
        Some(wanted) => host
            .output_devices()?
            .find(|device| device_name(device).as_deref() == Some(wanted))
            .ok_or_else(|| AudioError::device(format!("output device '{wanted}' not found"))),
    }
}
