//! Blocking PCM playback engine.
//!
//! Producers append [`queue::PlaybackItem`]s to a [`queue::PlaybackQueue`]; one playback
//! thread ([`worker::PlaybackLoop`]) decodes each item to a [`format::PcmBuffer`] and
//! writes it to an [`device::OutputDevice`] in period-sized chunks, recovering from
//! underruns and padding the final period with silence.

pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod format;
pub mod player;
pub mod queue;
pub mod tone;
pub mod worker;

mod playback;
mod ring;

#[cfg(test)]
mod mock;
