//! Scripted [`OutputDevice`] used by writer and playback-loop tests.

use std::collections::VecDeque;

use crate::device::{FramesWritten, NegotiatedConfig, OutputDevice};
use crate::error::{DeviceError, NegotiationStage};
use crate::format::DeviceConfig;

/// Outcome of one `write_frames` call.
#[derive(Clone, Copy, Debug)]
pub(crate) enum WriteStep {
    /// Accept every offered frame.
    Accept,
    /// Accept at most this many frames.
    Short(usize),
    Underrun,
    Fail,
}

#[derive(Default)]
pub(crate) struct MockDevice {
    pub(crate) script: VecDeque<WriteStep>,
    /// Samples accepted by each successful write, in order.
    pub(crate) writes: Vec<Vec<i16>>,
    /// Every offered chunk, including rejected ones.
    pub(crate) offered: Vec<Vec<i16>>,
    pub(crate) recoveries: usize,
    pub(crate) drains: usize,
    pub(crate) configs: Vec<DeviceConfig>,
    pub(crate) fail_reconfigure: bool,
    pub(crate) negotiated: Option<NegotiatedConfig>,
}

impl MockDevice {
    pub(crate) fn scripted(steps: impl IntoIterator<Item = WriteStep>) -> Self {
        Self {
            script: steps.into_iter().collect(),
            ..Self::default()
        }
    }

    fn channels(&self) -> usize {
        self.negotiated
            .as_ref()
            .map(|n| usize::from(n.format.channels))
            .unwrap_or(1)
    }

    /// Every accepted sample, concatenated.
    pub(crate) fn played(&self) -> Vec<i16> {
        self.writes.concat()
    }
}

impl OutputDevice for MockDevice {
    fn reconfigure(&mut self, requested: &DeviceConfig) -> Result<(), DeviceError> {
        self.configs.push(*requested);
        if self.fail_reconfigure {
            self.negotiated = None;
            return Err(DeviceError::configuration(
                NegotiationStage::Channels,
                "scripted failure",
            ));
        }
        self.negotiated = Some(NegotiatedConfig {
            format: requested.format,
            sample_format: cpal::SampleFormat::I16,
            buffer_frames: Some(requested.requested_buffer_frames()),
            frames_per_period: requested.frames_per_period,
        });
        Ok(())
    }

    fn write_frames(&mut self, samples: &[i16]) -> Result<FramesWritten, DeviceError> {
        self.offered.push(samples.to_vec());
        let channels = self.channels();
        let frames = samples.len() / channels;
        let accepted = match self.script.pop_front().unwrap_or(WriteStep::Accept) {
            WriteStep::Accept => frames,
            WriteStep::Short(n) => frames.min(n),
            WriteStep::Underrun => return Err(DeviceError::Underrun),
            WriteStep::Fail => return Err(DeviceError::Io("scripted failure".to_string())),
        };
        self.writes.push(samples[..accepted * channels].to_vec());
        Ok(accepted)
    }

    fn recover_from_underrun(&mut self) -> Result<(), DeviceError> {
        self.recoveries += 1;
        Ok(())
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        self.drains += 1;
        Ok(())
    }

    fn negotiated(&self) -> Option<&NegotiatedConfig> {
        self.negotiated.as_ref()
    }
}
