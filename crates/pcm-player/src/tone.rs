//! Sine test tone generator.

use std::f32::consts::PI;
use std::time::Duration;

use crate::error::DecodeError;
use crate::format::{AudioFormat, PcmBuffer};

/// Generate a full-scale sine at `frequency_hz`, identical on every channel.
pub fn sine_wave(
    format: AudioFormat,
    frequency_hz: f32,
    duration: Duration,
) -> Result<PcmBuffer, DecodeError> {
    format.validate()?;
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
        return Err(DecodeError::InvalidFormat(format!(
            "tone frequency must be positive, got {frequency_hz}"
        )));
    }

    let frames = (duration.as_secs_f64() * f64::from(format.sample_rate)).round() as usize;
    let channels = usize::from(format.channels);
    let step = 2.0 * PI * frequency_hz / format.sample_rate as f32;

    let mut samples = Vec::with_capacity(frames * channels);
    for frame in 0..frames {
        let value = (f32::from(i16::MAX) * (step * frame as f32).sin()) as i16;
        samples.extend(std::iter::repeat_n(value, channels));
    }
    PcmBuffer::new(format, samples)
}
