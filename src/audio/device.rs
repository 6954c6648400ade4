// Output device discovery on the default cpal host

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

use crate::audio::output::AudioError;

#[derive(Clone, Debug)]
pub struct AudioDeviceInfo {
    pub id: String,
    pub name: String,
    pub is_default: bool,
}

pub struct AudioDeviceManager {
    host: Host,
}

impl AudioDeviceManager {
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    /// List every output device the host exposes
    pub fn list_output_devices(&self) -> Vec<AudioDeviceInfo> {
        let default_name = self
            .host
            .default_output_device()
            .and_then(|d| d.name().ok())
            .unwrap_or_default();

        let Ok(output_devices) = self.host.output_devices() else {
            log::warn!("Could not enumerate output devices");
            return Vec::new();
        };

        output_devices
            .enumerate()
            .filter_map(|(index, device)| {
                let name = device.name().ok()?;
                Some(AudioDeviceInfo {
                    id: format!("audio_out_{}", index),
                    is_default: name == default_name,
                    name,
                })
            })
            .collect()
    }

    pub fn get_default_output_device(&self) -> Option<Device> {
        self.host.default_output_device()
    }

    pub fn get_output_device_by_name(&self, device_name: &str) -> Option<Device> {
        self.host
            .output_devices()
            .ok()?
            .find(|device| device.name().is_ok_and(|name| name == device_name))
    }

    /// The named device when one is configured, the host default otherwise
    pub fn resolve_output_device(&self, device_name: Option<&str>) -> Result<Device, AudioError> {
        match device_name {
            Some(name) => self
                .get_output_device_by_name(name)
                .ok_or_else(|| AudioError::DeviceNotFound(name.to_string())),
            None => self.get_default_output_device().ok_or(AudioError::NoDevice),
        }
    }
}

impl Default for AudioDeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
