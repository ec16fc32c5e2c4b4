//! Error types for decoding, device negotiation and playback.
//!
//! Every value carries enough context (stage, cause) for a caller to render a
//! diagnostic line; nothing here is fatal to the process.

use std::fmt;

use thiserror::Error;

/// Failure while turning a resource into a [`crate::format::PcmBuffer`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The resource could not be read.
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),

    /// Framing or format metadata is malformed or unsupported.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
}

/// Step of the device negotiation sequence, in the order it runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NegotiationStage {
    Open,
    AccessMode,
    SampleFormat,
    SampleRate,
    Channels,
    BufferSize,
    Apply,
    Prepare,
}

impl fmt::Display for NegotiationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::AccessMode => "access mode",
            Self::SampleFormat => "sample format",
            Self::SampleRate => "sample rate",
            Self::Channels => "channel count",
            Self::BufferSize => "buffer size",
            Self::Apply => "apply parameters",
            Self::Prepare => "prepare",
        };
        f.write_str(name)
    }
}

/// Output device failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeviceError {
    /// A negotiation step could not be satisfied.
    #[error("cannot set {stage}: {cause}")]
    Configuration {
        stage: NegotiationStage,
        cause: String,
    },

    /// The device ran out of data mid-stream; call `recover_from_underrun` before writing again.
    #[error("buffer underrun")]
    Underrun,

    /// Any other device failure.
    #[error("device i/o failed: {0}")]
    Io(String),
}

impl DeviceError {
    pub fn configuration(stage: NegotiationStage, cause: impl fmt::Display) -> Self {
        Self::Configuration {
            stage,
            cause: cause.to_string(),
        }
    }
}

/// Failure playing one queued item.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("device configuration failed: {0}")]
    Configuration(DeviceError),

    /// A chunk underran again right after recovery.
    #[error("persistent underrun at frame {frame}")]
    PersistentUnderrun { frame: usize },

    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("device failure: {0}")]
    DeviceFailure(DeviceError),
}

impl PlaybackError {
    /// Short label for the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configure",
            Self::PersistentUnderrun { .. } => "write",
            Self::Decode(_) => "decode",
            Self::DeviceFailure(_) => "device",
        }
    }
}
