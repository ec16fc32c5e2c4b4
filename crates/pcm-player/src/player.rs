//! Stream writer: pushes one decoded buffer through an [`OutputDevice`].
//!
//! For each buffer the writer:
//! 1. reconfigures the device for the buffer's native format
//! 2. writes the samples in chunks of at most `frames_per_period` frames, following short
//!    writes and recovering a single underrun per chunk
//! 3. pads with silence up to the next period boundary so the last partial hardware
//!    period flushes without a click
//! 4. drains the device (it stays open for the next item)

use crate::device::OutputDevice;
use crate::error::{DeviceError, NegotiationStage, PlaybackError};
use crate::format::{DeviceConfig, PcmBuffer};

/// Counters collected while playing one buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlayStats {
    /// Data frames accepted by the device (silence excluded).
    pub frames_written: usize,
    /// Trailing silence frames written after the data.
    pub silence_frames: usize,
    /// Underruns recovered transparently.
    pub underruns_recovered: u32,
    /// Writes that accepted fewer frames than offered.
    pub short_writes: u32,
}

/// Frames of silence needed to complete the final period.
///
/// Zero when `total_frames` is already a whole number of periods.
pub fn trailing_silence_frames(total_frames: usize, frames_per_period: u32) -> usize {
    let period = frames_per_period.max(1) as usize;
    match total_frames % period {
        0 => 0,
        rem => period - rem,
    }
}

/// Play `pcm` on `device`, blocking until it has physically played out.
pub fn play<D: OutputDevice + ?Sized>(
    pcm: &PcmBuffer,
    device: &mut D,
    frames_per_period: u32,
) -> Result<PlayStats, PlaybackError> {
    let frames_per_period = frames_per_period.max(1);
    let format = pcm.format();
    device
        .reconfigure(&DeviceConfig::new(format, frames_per_period))
        .map_err(PlaybackError::Configuration)?;
    if let Some(negotiated) = device.negotiated() {
        if negotiated.format.channels != format.channels {
            return Err(PlaybackError::Configuration(DeviceError::configuration(
                NegotiationStage::Channels,
                format!(
                    "device runs {} channels, source has {}",
                    negotiated.format.channels, format.channels
                ),
            )));
        }
    }

    let channels = usize::from(format.channels);
    let period = frames_per_period as usize;
    let samples = pcm.samples();
    let mut stats = PlayStats::default();

    let mut cursor = 0;
    while cursor < samples.len() {
        let frames = ((samples.len() - cursor) / channels).min(period);
        let chunk = &samples[cursor..cursor + frames * channels];
        let written = write_chunk(device, chunk, channels, cursor / channels, &mut stats)?;
        cursor += written * channels;
    }
    stats.frames_written = cursor / channels;

    let silence_frames = trailing_silence_frames(pcm.frames(), frames_per_period);
    if silence_frames > 0 {
        let silence = vec![0i16; silence_frames * channels];
        let mut offset = 0;
        while offset < silence.len() {
            let written = write_chunk(
                device,
                &silence[offset..],
                channels,
                stats.frames_written + offset / channels,
                &mut stats,
            )?;
            offset += written * channels;
        }
        stats.silence_frames = silence_frames;
    }

    device.drain().map_err(PlaybackError::DeviceFailure)?;
    tracing::debug!(
        frames = stats.frames_written,
        silence_frames = stats.silence_frames,
        underruns = stats.underruns_recovered,
        short_writes = stats.short_writes,
        "buffer played"
    );
    Ok(stats)
}

/// Write one chunk, recovering and retrying it once on underrun.
///
/// `frame` is the chunk's position in the stream, used for diagnostics.
fn write_chunk<D: OutputDevice + ?Sized>(
    device: &mut D,
    chunk: &[i16],
    channels: usize,
    frame: usize,
    stats: &mut PlayStats,
) -> Result<usize, PlaybackError> {
    let offered = chunk.len() / channels;
    let written = match device.write_frames(chunk) {
        Ok(n) => n,
        Err(DeviceError::Underrun) => {
            tracing::warn!(frame, "buffer underrun occurred; recovering");
            device
                .recover_from_underrun()
                .map_err(PlaybackError::DeviceFailure)?;
            stats.underruns_recovered += 1;
            match device.write_frames(chunk) {
                Ok(n) => n,
                Err(DeviceError::Underrun) => {
                    return Err(PlaybackError::PersistentUnderrun { frame });
                }
                Err(e) => return Err(PlaybackError::DeviceFailure(e)),
            }
        }
        Err(e) => return Err(PlaybackError::DeviceFailure(e)),
    };

    if written == 0 {
        return Err(PlaybackError::DeviceFailure(DeviceError::Io(
            "device accepted no frames".to_string(),
        )));
    }
    if written < offered {
        stats.short_writes += 1;
    }
    Ok(written.min(offered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::AudioFormat;
    use crate::mock::{MockDevice, WriteStep};

    /// Stereo buffer whose samples count up from 1 so misplaced writes show.
    fn stereo(frames: usize) -> PcmBuffer {
        let samples = (1..=frames * 2).map(|s| s as i16).collect();
        PcmBuffer::new(AudioFormat::pcm16(44_100, 2), samples).unwrap()
    }

    fn expected_output(pcm: &PcmBuffer, silence_frames: usize) -> Vec<i16> {
        let mut out = pcm.samples().to_vec();
        out.extend(std::iter::repeat_n(0, silence_frames * 2));
        out
    }

    #[test]
    fn trailing_silence_completes_the_last_period() {
        assert_eq!(trailing_silence_frames(100, 32), 28);
        assert_eq!(trailing_silence_frames(96, 32), 0);
        assert_eq!(trailing_silence_frames(0, 32), 0);
        assert_eq!(trailing_silence_frames(1, 1), 0);
    }

    #[test]
    fn play_writes_period_chunks_then_silence_then_drains() {
        let pcm = stereo(100);
        let mut device = MockDevice::default();

        let stats = play(&pcm, &mut device, 32).unwrap();

        assert_eq!(stats.frames_written, 100);
        assert_eq!(stats.silence_frames, 28);
        let chunk_frames: Vec<usize> = device.writes.iter().map(|w| w.len() / 2).collect();
        assert_eq!(chunk_frames, vec![32, 32, 32, 4, 28]);
        assert_eq!(device.played(), expected_output(&pcm, 28));
        assert_eq!(device.drains, 1);
        assert_eq!(
            device.configs,
            vec![DeviceConfig::new(AudioFormat::pcm16(44_100, 2), 32)]
        );
    }

    #[test]
    fn play_skips_silence_when_periods_divide_evenly() {
        let pcm = stereo(96);
        let mut device = MockDevice::default();

        let stats = play(&pcm, &mut device, 32).unwrap();

        assert_eq!(stats.silence_frames, 0);
        assert_eq!(device.writes.len(), 3);
        assert_eq!(device.played(), pcm.samples());
    }

    #[test]
    fn short_writes_advance_by_accepted_frames() {
        let pcm = stereo(40);
        let mut device = MockDevice::scripted([WriteStep::Short(10), WriteStep::Short(5)]);

        let stats = play(&pcm, &mut device, 32).unwrap();

        assert_eq!(stats.frames_written, 40);
        assert_eq!(stats.short_writes, 2);
        assert_eq!(device.offered[1][0], pcm.samples()[20]);
        assert_eq!(device.played(), expected_output(&pcm, 24));
    }

    #[test]
    fn single_underrun_retries_same_chunk_once() {
        let pcm = stereo(96);
        let mut device =
            MockDevice::scripted([WriteStep::Accept, WriteStep::Underrun, WriteStep::Accept]);

        let stats = play(&pcm, &mut device, 32).unwrap();

        assert_eq!(device.recoveries, 1);
        assert_eq!(stats.underruns_recovered, 1);
        assert_eq!(device.offered.len(), 4);
        assert_eq!(device.offered[1], device.offered[2]);
        assert_eq!(device.played(), pcm.samples());
    }

    #[test]
    fn second_consecutive_underrun_is_surfaced() {
        let pcm = stereo(96);
        let mut device =
            MockDevice::scripted([WriteStep::Accept, WriteStep::Underrun, WriteStep::Underrun]);

        let err = play(&pcm, &mut device, 32).unwrap_err();

        assert!(matches!(err, PlaybackError::PersistentUnderrun { frame: 32 }));
        assert_eq!(device.recoveries, 1);
        assert_eq!(device.offered.len(), 3);
        assert_eq!(device.drains, 0);
    }

    #[test]
    fn underruns_on_different_chunks_are_each_recovered() {
        let pcm = stereo(96);
        let mut device = MockDevice::scripted([
            WriteStep::Underrun,
            WriteStep::Accept,
            WriteStep::Underrun,
            WriteStep::Accept,
        ]);

        let stats = play(&pcm, &mut device, 32).unwrap();

        assert_eq!(stats.underruns_recovered, 2);
        assert_eq!(device.played(), pcm.samples());
    }

    #[test]
    fn underrun_during_silence_fill_is_recovered() {
        let pcm = stereo(10);
        let mut device = MockDevice::scripted([WriteStep::Accept, WriteStep::Underrun]);

        let stats = play(&pcm, &mut device, 32).unwrap();

        assert_eq!(stats.silence_frames, 22);
        assert_eq!(device.recoveries, 1);
        assert_eq!(device.played(), expected_output(&pcm, 22));
    }

    #[test]
    fn io_failure_aborts_without_retry() {
        let pcm = stereo(64);
        let mut device = MockDevice::scripted([WriteStep::Fail]);

        let err = play(&pcm, &mut device, 32).unwrap_err();

        assert!(matches!(err, PlaybackError::DeviceFailure(DeviceError::Io(_))));
        assert_eq!(device.offered.len(), 1);
        assert_eq!(device.recoveries, 0);
    }

    #[test]
    fn zero_frame_write_is_a_device_failure() {
        let pcm = stereo(8);
        let mut device = MockDevice::scripted([WriteStep::Short(0)]);

        let err = play(&pcm, &mut device, 32).unwrap_err();
        assert!(matches!(err, PlaybackError::DeviceFailure(_)));
    }

    #[test]
    fn configuration_failure_writes_nothing() {
        let pcm = stereo(8);
        let mut device = MockDevice {
            fail_reconfigure: true,
            ..MockDevice::default()
        };

        let err = play(&pcm, &mut device, 32).unwrap_err();

        assert!(matches!(err, PlaybackError::Configuration(_)));
        assert!(device.offered.is_empty());
    }

    #[test]
    fn cursor_never_passes_the_buffer_end() {
        let pcm = stereo(33);
        let mut device = MockDevice::default();

        let stats = play(&pcm, &mut device, 32).unwrap();

        let data_samples: usize = device.writes[..2].iter().map(Vec::len).sum();
        assert_eq!(data_samples, pcm.samples().len());
        assert_eq!(stats.frames_written, pcm.frames());
        assert_eq!(stats.silence_frames, 31);
    }
}
