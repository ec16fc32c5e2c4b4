//! Output callback stage (CPAL output stream).
//!
//! Builds the CPAL output stream whose real-time callback drains an [`OutputRing`]:
//! - pulls whole interleaved frames without waiting on the writer
//! - converts `i16` samples to the negotiated device sample format
//! - pads with silence when the ring is short (the ring records the underrun)

use std::sync::Arc;

use cpal::traits::DeviceTrait;

use crate::error::{DeviceError, NegotiationStage};
use crate::ring::OutputRing;

/// Build a CPAL output stream that plays audio from `ring`.
///
/// `ring` must carry interleaved samples with `config.channels` channels. Stream errors
/// reported by the backend mark the ring failed so the blocked writer wakes up.
pub(crate) fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    ring: &Arc<OutputRing>,
) -> Result<cpal::Stream, DeviceError> {
    match sample_format {
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, ring),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, ring),
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, ring),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, ring),
        other => Err(DeviceError::configuration(
            NegotiationStage::SampleFormat,
            format!("unsupported device sample format {other:?}"),
        )),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    ring: &Arc<OutputRing>,
) -> Result<cpal::Stream, DeviceError>
where
    T: cpal::SizedSample + cpal::FromSample<i16>,
{
    let ring_cb = ring.clone();
    let ring_err = ring.clone();

    let err_fn = move |err: cpal::StreamError| {
        tracing::warn!("stream error: {err}");
        if matches!(err, cpal::StreamError::DeviceNotAvailable) {
            ring_err.fail(err.to_string());
        }
    };

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                ring_cb.fill(
                    data,
                    <T as cpal::Sample>::EQUILIBRIUM,
                    <T as cpal::Sample>::from_sample::<i16>,
                );
            },
            err_fn,
            None,
        )
        .map_err(|e| DeviceError::configuration(NegotiationStage::Apply, e))
}
