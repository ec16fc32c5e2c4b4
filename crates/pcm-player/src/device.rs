//! Output device negotiation and the blocking frame writer.
//!
//! - [`negotiate`] narrows the device-reported config space in a fixed order
//!   (access, sample format, rate, channels, buffer size)
//! - [`CpalDevice`] applies the result to a CPAL output stream and exposes a blocking,
//!   underrun-aware write on top of an [`OutputRing`]
//! - [`OutputDevice`] is the seam the writer and playback loop are generic over

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::{DeviceError, NegotiationStage};
use crate::format::{AudioFormat, DeviceConfig};
use crate::playback;
use crate::ring::OutputRing;

/// Frames accepted by a single write.
pub type FramesWritten = usize;

/// Staging ring size used when the device does not report a buffer size.
const DEFAULT_RING_FRAMES: usize = 4096;

/// Blocking, device-paced PCM sink.
pub trait OutputDevice {
    /// Re-run the full negotiation, replacing any previous parameters.
    fn reconfigure(&mut self, requested: &DeviceConfig) -> Result<(), DeviceError>;

    /// Write interleaved `samples`, blocking until the device accepts at least one frame.
    ///
    /// Returns the frames accepted, which may be fewer than offered.
    fn write_frames(&mut self, samples: &[i16]) -> Result<FramesWritten, DeviceError>;

    /// Return to the prepared state after [`DeviceError::Underrun`].
    fn recover_from_underrun(&mut self) -> Result<(), DeviceError>;

    /// Block until every buffered frame has played. The device stays open.
    fn drain(&mut self) -> Result<(), DeviceError>;

    /// Parameters currently in effect, if configured.
    fn negotiated(&self) -> Option<&NegotiatedConfig>;
}

/// One contiguous region of the device's supported configuration space.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfigRange {
    pub channels: u16,
    pub min_rate: u32,
    pub max_rate: u32,
    /// Supported buffer sizes in frames; `None` when the device does not say.
    pub buffer_frames: Option<(u32, u32)>,
    pub sample_format: cpal::SampleFormat,
}

impl From<&cpal::SupportedStreamConfigRange> for ConfigRange {
    fn from(range: &cpal::SupportedStreamConfigRange) -> Self {
        let buffer_frames = match range.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max } => Some((*min, *max)),
            cpal::SupportedBufferSize::Unknown => None,
        };
        Self {
            channels: range.channels(),
            min_rate: range.min_sample_rate(),
            max_rate: range.max_sample_rate(),
            buffer_frames,
            sample_format: range.sample_format(),
        }
    }
}

/// Result of a successful negotiation.
///
/// `format.sample_rate` is the rate the device actually runs at and may differ from the
/// requested one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiatedConfig {
    pub format: AudioFormat,
    pub sample_format: cpal::SampleFormat,
    /// Device buffer size in frames; `None` means the backend default.
    pub buffer_frames: Option<u32>,
    pub frames_per_period: u32,
}

impl NegotiatedConfig {
    fn stream_config(&self) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: self.format.channels,
            sample_rate: self.format.sample_rate,
            buffer_size: match self.buffer_frames {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        }
    }

    fn ring_frames(&self) -> usize {
        let periods = self.frames_per_period as usize * 4;
        match self.buffer_frames {
            Some(frames) => (frames as usize * 2).max(periods),
            None => DEFAULT_RING_FRAMES.max(periods),
        }
    }
}

/// Narrow `ranges` to a single configuration for `requested`, one parameter at a time.
///
/// Each step only sees the ranges that survived the previous ones, so a rate choice
/// constrains the channel check and both constrain the buffer size.
pub fn negotiate(
    ranges: &[ConfigRange],
    requested: &DeviceConfig,
) -> Result<NegotiatedConfig, DeviceError> {
    if ranges.is_empty() {
        return Err(DeviceError::configuration(
            NegotiationStage::AccessMode,
            "device reports no interleaved output configurations",
        ));
    }

    let sample_format = ranges
        .iter()
        .filter_map(|r| sample_format_rank(r.sample_format).map(|rank| (rank, r.sample_format)))
        .min_by_key(|(rank, _)| *rank)
        .map(|(_, format)| format)
        .ok_or_else(|| {
            DeviceError::configuration(
                NegotiationStage::SampleFormat,
                "no signed 16-bit compatible sample format",
            )
        })?;
    let ranges: Vec<&ConfigRange> = ranges
        .iter()
        .filter(|r| r.sample_format == sample_format)
        .collect();

    let target_rate = requested.format.sample_rate;
    if target_rate == 0 {
        return Err(DeviceError::configuration(
            NegotiationStage::SampleRate,
            "requested rate is zero",
        ));
    }
    let rate = ranges
        .iter()
        .map(|r| nearest_in_range(r.min_rate, r.max_rate, target_rate))
        .min_by_key(|rate| (rate.abs_diff(target_rate), u32::MAX - rate))
        .ok_or_else(|| {
            DeviceError::configuration(NegotiationStage::SampleRate, "no rate available")
        })?;
    let ranges: Vec<&ConfigRange> = ranges
        .into_iter()
        .filter(|r| r.min_rate <= rate && rate <= r.max_rate)
        .collect();

    let channels = requested.format.channels;
    let ranges: Vec<&ConfigRange> = ranges
        .into_iter()
        .filter(|r| r.channels == channels)
        .collect();
    let Some(chosen) = ranges.first() else {
        return Err(DeviceError::configuration(
            NegotiationStage::Channels,
            format!("{channels} channels not available at {rate} Hz"),
        ));
    };

    let target_buffer = requested.requested_buffer_frames();
    if target_buffer == 0 {
        return Err(DeviceError::configuration(
            NegotiationStage::BufferSize,
            "requested buffer size is zero",
        ));
    }
    let buffer_frames = chosen
        .buffer_frames
        .map(|(min, max)| nearest_in_range(min, max, target_buffer));

    Ok(NegotiatedConfig {
        format: AudioFormat::pcm16(rate, channels),
        sample_format,
        buffer_frames,
        frames_per_period: requested.frames_per_period,
    })
}

/// Lower rank is preferred; `None` means the callback cannot convert into it.
fn sample_format_rank(format: cpal::SampleFormat) -> Option<u8> {
    match format {
        cpal::SampleFormat::I16 => Some(0),
        cpal::SampleFormat::I32 => Some(1),
        cpal::SampleFormat::F32 => Some(2),
        cpal::SampleFormat::U16 => Some(3),
        _ => None,
    }
}

fn nearest_in_range(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max.max(min))
}

/// Pick the first output device whose name contains `needle` (case-insensitive), or the
/// host default when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device, DeviceError> {
    let open_err = |cause: String| DeviceError::configuration(NegotiationStage::Open, cause);

    if let Some(needle) = needle {
        let mut devices = host
            .output_devices()
            .map_err(|e| open_err(format!("cannot enumerate output devices: {e}")))?;
        return devices
            .find(|d| {
                d.description()
                    .ok()
                    .map(|n| matches_device_name(&n.name(), needle))
                    .unwrap_or(false)
            })
            .ok_or_else(|| open_err(format!("no output device matched: {needle}")));
    }

    host.default_output_device()
        .ok_or_else(|| open_err("no default output device".to_string()))
}

/// Print available output devices and their rate ranges to stdout.
pub fn list_devices(host: &cpal::Host) -> Result<(), DeviceError> {
    let devices = host
        .output_devices()
        .map_err(|e| DeviceError::Io(format!("cannot enumerate output devices: {e}")))?;
    for (i, d) in devices.enumerate() {
        let name = device_name(&d);
        let ranges = supported_ranges(&d).unwrap_or_default();
        let min = ranges.iter().map(|r| r.min_rate).min();
        let max = ranges.iter().map(|r| r.max_rate).max();
        match (min, max) {
            (Some(min), Some(max)) => println!("#{i}: {name} ({min}-{max} Hz)"),
            _ => println!("#{i}: {name}"),
        }
    }
    Ok(())
}

fn supported_ranges(device: &cpal::Device) -> Result<Vec<ConfigRange>, DeviceError> {
    let ranges = device.supported_output_configs().map_err(|e| {
        DeviceError::configuration(NegotiationStage::AccessMode, e)
    })?;
    Ok(ranges.map(|r| ConfigRange::from(&r)).collect())
}

fn device_name(device: &cpal::Device) -> String {
    device
        .description()
        .map(|d| d.to_string())
        .unwrap_or_else(|_| "<unknown>".to_string())
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

/// Running output stream plus the ring feeding it.
struct ActiveStream {
    // Held only to keep the callback alive.
    _stream: cpal::Stream,
    ring: Arc<OutputRing>,
    negotiated: NegotiatedConfig,
}

/// CPAL-backed [`OutputDevice`].
///
/// Owned by the thread that opened it. Release happens exactly once: either through
/// [`CpalDevice::drain_and_close`] or, failing that, on drop.
pub struct CpalDevice {
    device: cpal::Device,
    name: String,
    active: Option<ActiveStream>,
    closed: bool,
}

impl CpalDevice {
    /// Open the default output (or the one matching `needle`) and negotiate `requested`.
    pub fn open_and_configure(
        host: &cpal::Host,
        needle: Option<&str>,
        requested: &DeviceConfig,
    ) -> Result<Self, DeviceError> {
        let device = pick_device(host, needle)?;
        let name = device_name(&device);
        tracing::info!(device = %name, "output device");
        let mut out = Self {
            device,
            name,
            active: None,
            closed: false,
        };
        out.reconfigure(requested)?;
        Ok(out)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underruns recovered since the current configuration was applied.
    pub fn underruns(&self) -> u64 {
        self.active.as_ref().map(|a| a.ring.underruns()).unwrap_or(0)
    }

    /// Play out pending audio, then release the stream and device handle.
    pub fn drain_and_close(mut self) -> Result<(), DeviceError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), DeviceError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = match self.active.as_ref() {
            Some(active) => active.ring.drain(),
            None => Ok(()),
        };
        self.active = None;
        tracing::info!(device = %self.name, "output device closed");
        result
    }

    fn active(&self) -> Result<&ActiveStream, DeviceError> {
        if self.closed {
            return Err(DeviceError::Io("device is closed".to_string()));
        }
        self.active
            .as_ref()
            .ok_or_else(|| DeviceError::Io("device is not configured".to_string()))
    }
}

impl OutputDevice for CpalDevice {
    fn reconfigure(&mut self, requested: &DeviceConfig) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::Io("device is closed".to_string()));
        }
        // Tear the previous stream down first; a failed negotiation leaves the device
        // open but unconfigured.
        self.active = None;

        let ranges = supported_ranges(&self.device)?;
        let negotiated = negotiate(&ranges, requested)?;
        if negotiated.format.sample_rate != requested.format.sample_rate {
            tracing::warn!(
                requested_hz = requested.format.sample_rate,
                negotiated_hz = negotiated.format.sample_rate,
                "device substituted sample rate"
            );
        }

        let ring = Arc::new(OutputRing::new(
            usize::from(negotiated.format.channels),
            negotiated.ring_frames(),
        ));
        let stream = playback::build_output_stream(
            &self.device,
            &negotiated.stream_config(),
            negotiated.sample_format,
            &ring,
        )?;
        stream
            .play()
            .map_err(|e| DeviceError::configuration(NegotiationStage::Prepare, e))?;

        tracing::info!(
            device = %self.name,
            rate_hz = negotiated.format.sample_rate,
            channels = negotiated.format.channels,
            sample_format = ?negotiated.sample_format,
            buffer_frames = ?negotiated.buffer_frames,
            ring_frames = negotiated.ring_frames(),
            "device configured"
        );
        self.active = Some(ActiveStream {
            _stream: stream,
            ring,
            negotiated,
        });
        Ok(())
    }

    fn write_frames(&mut self, samples: &[i16]) -> Result<FramesWritten, DeviceError> {
        self.active()?.ring.push_blocking(samples)
    }

    fn recover_from_underrun(&mut self) -> Result<(), DeviceError> {
        let active = self.active()?;
        tracing::debug!(
            device = %self.name,
            buffered_frames = active.ring.buffered_frames(),
            "re-arming after underrun"
        );
        active.ring.recover()
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        self.active()?.ring.drain()
    }

    fn negotiated(&self) -> Option<&NegotiatedConfig> {
        self.active.as_ref().map(|a| &a.negotiated)
    }
}

impl Drop for CpalDevice {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            tracing::warn!(device = %self.name, "drain on drop failed: {e}");
        }
    }
}
