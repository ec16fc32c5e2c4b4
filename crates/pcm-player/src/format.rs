//! PCM data model shared by the decode, device and playback stages.
//!
//! Samples are always carried **interleaved** as signed 16-bit values:
//! `frame0[ch0], frame0[ch1], ..., frame1[ch0], frame1[ch1], ...`

use crate::error::DecodeError;

/// Bit depth of every buffer this crate produces or plays.
pub const BITS_PER_SAMPLE: u16 = 16;

/// Format metadata for an interleaved PCM stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AudioFormat {
    /// Frames per second.
    pub sample_rate: u32,
    /// Interleaved channel count (`>= 1`).
    pub channels: u16,
    /// Bits per sample (`> 0`, multiple of 8).
    pub bits_per_sample: u16,
}

impl AudioFormat {
    /// Signed 16-bit format at `sample_rate` with `channels` channels.
    pub fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: BITS_PER_SAMPLE,
        }
    }

    /// Check the format invariants.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.channels == 0 {
            return Err(DecodeError::InvalidFormat("channel count is zero".to_string()));
        }
        if self.sample_rate == 0 {
            return Err(DecodeError::InvalidFormat("sample rate is zero".to_string()));
        }
        if self.bits_per_sample == 0 || self.bits_per_sample % 8 != 0 {
            return Err(DecodeError::InvalidFormat(format!(
                "bits per sample must be a non-zero multiple of 8, got {}",
                self.bits_per_sample
            )));
        }
        Ok(())
    }

    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bits_per_sample / 8)
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }
}

/// Decoded interleaved samples plus their format.
///
/// Immutable once built; the sample count is always a whole number of frames.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PcmBuffer {
    format: AudioFormat,
    samples: Vec<i16>,
}

impl PcmBuffer {
    /// Wrap `samples`, rejecting partial frames and invalid formats.
    pub fn new(format: AudioFormat, samples: Vec<i16>) -> Result<Self, DecodeError> {
        format.validate()?;
        if format.bits_per_sample != BITS_PER_SAMPLE {
            return Err(DecodeError::InvalidFormat(format!(
                "unsupported bit depth {}",
                format.bits_per_sample
            )));
        }
        if samples.len() % usize::from(format.channels) != 0 {
            return Err(DecodeError::InvalidFormat(format!(
                "{} samples is not a whole number of {}-channel frames",
                samples.len(),
                format.channels
            )));
        }
        Ok(Self { format, samples })
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of interleaved frames.
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(self.format.channels)
    }

    /// Best-effort duration in milliseconds.
    pub fn duration_ms(&self) -> u64 {
        (self.frames() as u64).saturating_mul(1000) / u64::from(self.format.sample_rate)
    }
}

/// Parameters requested from an output device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceConfig {
    pub format: AudioFormat,
    /// Chunk granularity used by the writer, in frames.
    pub frames_per_period: u32,
}

impl DeviceConfig {
    pub fn new(format: AudioFormat, frames_per_period: u32) -> Self {
        Self {
            format,
            frames_per_period,
        }
    }

    /// Buffer size (frames) asked of the device before it rounds to a supported value.
    pub fn requested_buffer_frames(&self) -> u32 {
        self.frames_per_period.saturating_mul(4)
    }
}
