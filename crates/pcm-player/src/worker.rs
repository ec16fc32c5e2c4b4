//! Playback worker.
//!
//! The single consumer of a [`PlaybackQueue`]: dequeues items in FIFO order, decodes
//! them through a [`PcmSource`] and plays them with [`player::play`]. A failing item is
//! reported and skipped; the loop only stops on shutdown or when the queue is closed
//! and empty.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::config::PlaybackConfig;
use crate::decode::PcmSource;
use crate::device::{CpalDevice, OutputDevice};
use crate::error::{DeviceError, PlaybackError};
use crate::format::AudioFormat;
use crate::player::{self, PlayStats};
use crate::queue::{PlaybackItem, PlaybackQueue};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting for the queue.
    Idle,
    /// An item is being decoded or written.
    Playing,
}

/// Progress reported by the worker for each item.
#[derive(Debug)]
pub enum PlaybackEvent {
    Started {
        item: PlaybackItem,
        format: AudioFormat,
    },
    Finished {
        item: PlaybackItem,
        stats: PlayStats,
    },
    Failed {
        item: PlaybackItem,
        error: PlaybackError,
    },
}

/// Totals for one run of the loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopSummary {
    pub played: usize,
    pub failed: usize,
    /// Items still queued when shutdown was requested.
    pub abandoned: usize,
}

pub struct PlaybackLoop<S, D> {
    source: S,
    device: D,
    frames_per_period: u32,
    poll_interval: Duration,
    events: Option<Sender<PlaybackEvent>>,
    state: LoopState,
}

impl<S: PcmSource, D: OutputDevice> PlaybackLoop<S, D> {
    pub fn new(source: S, device: D, config: &PlaybackConfig) -> Self {
        Self {
            source,
            device,
            frames_per_period: config.frames_per_period,
            poll_interval: config.poll_interval,
            events: None,
            state: LoopState::Idle,
        }
    }

    /// Publish [`PlaybackEvent`]s on `events`.
    pub fn with_events(mut self, events: Sender<PlaybackEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    /// Consume `queue` until `shutdown` is set or the queue is closed and empty.
    ///
    /// `shutdown` is checked between items; an item already playing runs to completion.
    pub fn run(&mut self, queue: &PlaybackQueue, shutdown: &AtomicBool) -> LoopSummary {
        let mut summary = LoopSummary::default();
        loop {
            if shutdown.load(Ordering::Relaxed) {
                summary.abandoned = queue.drain_all();
                tracing::info!(abandoned = summary.abandoned, "playback loop stopping");
                break;
            }

            let Some(item) = queue.dequeue_timeout(self.poll_interval) else {
                if queue.is_closed() && queue.is_empty() {
                    tracing::info!("playback queue closed and drained");
                    break;
                }
                continue;
            };

            match self.play_item(&item) {
                Ok(stats) => {
                    summary.played += 1;
                    tracing::debug!(
                        item = %item.resource_id,
                        frames = stats.frames_written,
                        underruns = stats.underruns_recovered,
                        "item finished"
                    );
                    self.emit(PlaybackEvent::Finished { item, stats });
                }
                Err(error) => {
                    summary.failed += 1;
                    tracing::debug!(
                        item = %item.resource_id,
                        stage = error.stage(),
                        "item failed: {error}"
                    );
                    self.emit(PlaybackEvent::Failed { item, error });
                }
            }
        }
        summary
    }

    /// Decode and play one item, returning to [`LoopState::Idle`] afterwards.
    pub fn play_item(&mut self, item: &PlaybackItem) -> Result<PlayStats, PlaybackError> {
        self.state = LoopState::Playing;
        let result = self.decode_and_play(item);
        self.state = LoopState::Idle;
        result
    }

    fn decode_and_play(&mut self, item: &PlaybackItem) -> Result<PlayStats, PlaybackError> {
        let pcm = self.source.decode(&item.resource_id)?;
        let format = pcm.format();
        tracing::debug!(
            item = %item.resource_id,
            rate_hz = format.sample_rate,
            channels = format.channels,
            duration_ms = pcm.duration_ms(),
            "item started"
        );
        self.emit(PlaybackEvent::Started {
            item: item.clone(),
            format,
        });
        player::play(&pcm, &mut self.device, self.frames_per_period)
    }

    fn emit(&self, event: PlaybackEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}

/// Spawn the playback thread.
///
/// The output device is opened on the new thread and never leaves it. The queue is
/// closed if the device cannot be opened so producers stop feeding it.
pub fn spawn_playback_worker<S>(
    source: S,
    config: PlaybackConfig,
    queue: Arc<PlaybackQueue>,
    shutdown: Arc<AtomicBool>,
    events: Option<Sender<PlaybackEvent>>,
) -> std::io::Result<JoinHandle<Result<LoopSummary, DeviceError>>>
where
    S: PcmSource + Send + 'static,
{
    thread::Builder::new()
        .name("playback".to_string())
        .spawn(move || {
            let host = cpal::default_host();
            let device = match CpalDevice::open_and_configure(
                &host,
                config.device.as_deref(),
                &config.initial_device_config(),
            ) {
                Ok(device) => device,
                Err(e) => {
                    queue.close();
                    return Err(e);
                }
            };

            let mut playback = PlaybackLoop::new(source, device, &config);
            if let Some(tx) = events {
                playback = playback.with_events(tx);
            }
            let summary = playback.run(&queue, &shutdown);
            let device = playback.into_device();
            if device.underruns() > 0 {
                tracing::info!(underruns = device.underruns(), "device underruns this run");
            }
            device.drain_and_close()?;
            Ok(summary)
        })
}
