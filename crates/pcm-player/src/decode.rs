//! PCM source stage.
//!
//! Reads a RIFF/WAVE container into a [`PcmBuffer`] through `hound`:
//! - accepts only linear 16-bit integer PCM
//! - never returns a partially read buffer; a data section shorter than its header
//!   declares is an error

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

use crate::error::DecodeError;
use crate::format::{AudioFormat, BITS_PER_SAMPLE, PcmBuffer};

/// Produces decoded PCM for a named resource.
pub trait PcmSource {
    fn decode(&self, resource_id: &str) -> Result<PcmBuffer, DecodeError>;
}

/// [`PcmSource`] that treats resource ids as WAV file paths.
///
/// Relative ids are resolved against `root` when one is set.
#[derive(Clone, Debug, Default)]
pub struct WavFileSource {
    root: Option<PathBuf>,
}

impl WavFileSource {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Resolve a resource id to the file it names.
    pub fn resolve(&self, resource_id: &str) -> PathBuf {
        let path = Path::new(resource_id);
        match &self.root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

impl PcmSource for WavFileSource {
    fn decode(&self, resource_id: &str) -> Result<PcmBuffer, DecodeError> {
        let path = self.resolve(resource_id);
        let file = File::open(&path)?;
        let pcm = read_wav(BufReader::new(file))?;
        tracing::debug!(
            path = ?path,
            rate_hz = pcm.format().sample_rate,
            channels = pcm.format().channels,
            frames = pcm.frames(),
            "decoded wav"
        );
        Ok(pcm)
    }
}

/// Decode a complete WAVE stream from `reader`.
pub fn read_wav<R: Read>(reader: R) -> Result<PcmBuffer, DecodeError> {
    let reader = hound::WavReader::new(reader).map_err(|e| wav_error(e, "header"))?;
    let spec = reader.spec();
    if spec.sample_format != hound::SampleFormat::Int {
        return Err(DecodeError::InvalidFormat(
            "floating-point samples are not linear PCM".to_string(),
        ));
    }
    if spec.bits_per_sample != BITS_PER_SAMPLE {
        return Err(DecodeError::InvalidFormat(format!(
            "{}-bit samples are not supported",
            spec.bits_per_sample
        )));
    }
    let format = AudioFormat::pcm16(spec.sample_rate, spec.channels);
    format.validate()?;

    // Grows with the bytes actually present, not with the declared data size.
    let samples = reader
        .into_samples::<i16>()
        .collect::<Result<Vec<i16>, _>>()
        .map_err(|e| wav_error(e, "data section"))?;
    PcmBuffer::new(format, samples)
}

/// Map a `hound` error; running out of input in `section` is a format error.
fn wav_error(err: hound::Error, section: &str) -> DecodeError {
    match err {
        hound::Error::IoError(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            DecodeError::InvalidFormat(format!("truncated {section}"))
        }
        hound::Error::IoError(e) => DecodeError::Io(e),
        other => DecodeError::InvalidFormat(format!("{section}: {other}")),
    }
}
