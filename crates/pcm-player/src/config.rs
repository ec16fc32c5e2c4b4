use std::time::Duration;

use crate::format::{AudioFormat, DeviceConfig};

/// Playback tuning parameters shared by the device, writer and worker stages.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackConfig {
    /// Writer chunk size in frames; the device buffer is negotiated at four times this.
    pub frames_per_period: u32,
    /// Sample rate used to open the device before the first item arrives.
    pub sample_rate: u32,
    /// Channel count used to open the device before the first item arrives.
    pub channels: u16,
    /// Output device name substring; `None` selects the host default.
    pub device: Option<String>,
    /// How often an idle worker wakes to check for shutdown.
    pub poll_interval: Duration,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            frames_per_period: 32,
            sample_rate: 44_100,
            channels: 2,
            device: None,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl PlaybackConfig {
    /// Device parameters used to open the output before any item is played.
    pub fn initial_device_config(&self) -> DeviceConfig {
        DeviceConfig::new(
            AudioFormat::pcm16(self.sample_rate, self.channels),
            self.frames_per_period,
        )
    }
}
