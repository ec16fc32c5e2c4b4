//! Runner entry points.
//!
//! Each command wires producers, the playback worker and an event logger around one
//! shared [`PlaybackQueue`].

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use crossbeam_channel::Receiver;

use crate::config::PlayerSettings;
use pcm_player::decode::WavFileSource;
use pcm_player::device::{self, CpalDevice};
use pcm_player::format::{AudioFormat, DeviceConfig};
use pcm_player::player;
use pcm_player::queue::{PlaybackItem, PlaybackQueue};
use pcm_player::tone;
use pcm_player::worker::{LoopSummary, PlaybackEvent, spawn_playback_worker};

/// List output devices and print them to stdout.
pub fn list_devices() -> Result<()> {
    let host = cpal::default_host();
    device::list_devices(&host)?;
    Ok(())
}

/// Play `paths` in order, `repeat` times over, then exit once the queue is drained.
pub fn run_play(settings: PlayerSettings, paths: &[PathBuf], repeat: u32) -> Result<LoopSummary> {
    let queue = Arc::new(PlaybackQueue::new());
    enqueue_paths(&queue, paths, repeat);
    queue.close();
    tracing::info!(items = queue.len(), "queued files");

    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc(&queue, &shutdown)?;
    run_worker(settings, queue, shutdown)
}

/// Play resource ids read from standard input as they arrive.
///
/// Input ends the session at EOF; everything already queued still plays.
pub fn run_stdin(settings: PlayerSettings) -> Result<LoopSummary> {
    let queue = Arc::new(PlaybackQueue::new());
    let shutdown = Arc::new(AtomicBool::new(false));
    install_ctrlc(&queue, &shutdown)?;

    // Detached: a read blocked on the terminal must not hold up shutdown.
    let _producer = spawn_stdin_producer(queue.clone(), shutdown.clone())
        .context("spawn stdin reader")?;
    run_worker(settings, queue, shutdown)
}

/// Generate a sine tone and play it through the stream writer.
pub fn run_tone(settings: PlayerSettings, frequency: f32, seconds: f32) -> Result<()> {
    let duration = Duration::try_from_secs_f32(seconds)
        .map_err(|e| anyhow!("invalid tone length {seconds}: {e}"))?;
    let playback = &settings.playback;
    let format = AudioFormat::pcm16(playback.sample_rate, playback.channels);
    let pcm = tone::sine_wave(format, frequency, duration)?;

    let host = cpal::default_host();
    let mut device = CpalDevice::open_and_configure(
        &host,
        playback.device.as_deref(),
        &DeviceConfig::new(format, playback.frames_per_period),
    )?;
    tracing::info!(
        device = %device.name(),
        frequency_hz = frequency,
        duration_ms = pcm.duration_ms(),
        "playing test tone"
    );
    let stats = player::play(&pcm, &mut device, playback.frames_per_period)?;
    tracing::info!(
        frames = stats.frames_written,
        silence_frames = stats.silence_frames,
        underruns = stats.underruns_recovered,
        "test tone finished"
    );
    device.drain_and_close()?;
    Ok(())
}

fn install_ctrlc(queue: &Arc<PlaybackQueue>, shutdown: &Arc<AtomicBool>) -> Result<()> {
    let queue = queue.clone();
    let shutdown = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("interrupt received; stopping after current item");
        shutdown.store(true, Ordering::Relaxed);
        queue.close();
    })
    .context("install ctrl-c handler")
}

fn run_worker(
    settings: PlayerSettings,
    queue: Arc<PlaybackQueue>,
    shutdown: Arc<AtomicBool>,
) -> Result<LoopSummary> {
    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let logger = spawn_event_logger(events_rx).context("spawn event logger")?;

    let source = WavFileSource::new(settings.media_root);
    let worker = spawn_playback_worker(
        source,
        settings.playback,
        queue,
        shutdown,
        Some(events_tx),
    )
    .context("spawn playback worker")?;

    let result = worker
        .join()
        .map_err(|_| anyhow!("playback thread panicked"))?;
    // The worker owned the only sender, so the logger ends once the backlog is written.
    let report = logger
        .join()
        .map_err(|_| anyhow!("event logger panicked"))?;

    let summary = result.context("output device")?;
    tracing::info!(
        played = summary.played,
        failed = summary.failed,
        abandoned = summary.abandoned,
        frames = report.frames_written,
        underruns = report.underruns_recovered,
        "playback finished"
    );
    Ok(summary)
}

/// Totals accumulated from [`PlaybackEvent`]s.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionReport {
    pub started: usize,
    pub finished: usize,
    pub failed: usize,
    pub frames_written: usize,
    pub underruns_recovered: u64,
}

impl SessionReport {
    /// Fold one event into the totals and log it.
    pub fn record(&mut self, event: &PlaybackEvent) {
        match event {
            PlaybackEvent::Started { item, format } => {
                self.started += 1;
                tracing::info!(
                    item = %item.resource_id,
                    rate_hz = format.sample_rate,
                    channels = format.channels,
                    "now playing"
                );
            }
            PlaybackEvent::Finished { item, stats } => {
                self.finished += 1;
                self.frames_written += stats.frames_written;
                self.underruns_recovered += u64::from(stats.underruns_recovered);
                tracing::info!(
                    item = %item.resource_id,
                    frames = stats.frames_written,
                    short_writes = stats.short_writes,
                    "done"
                );
            }
            PlaybackEvent::Failed { item, error } => {
                self.failed += 1;
                tracing::warn!(
                    item = %item.resource_id,
                    stage = error.stage(),
                    "skipped: {error}"
                );
            }
        }
    }
}

fn spawn_event_logger(events: Receiver<PlaybackEvent>) -> std::io::Result<JoinHandle<SessionReport>> {
    thread::Builder::new()
        .name("events".to_string())
        .spawn(move || {
            let mut report = SessionReport::default();
            for event in events.iter() {
                report.record(&event);
            }
            report
        })
}

fn spawn_stdin_producer(
    queue: Arc<PlaybackQueue>,
    shutdown: Arc<AtomicBool>,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            enqueue_lines(stdin.lock(), &queue, &shutdown);
            queue.close();
        })
}

/// Enqueue `paths` in order, `repeat` times over. Paths that are not valid UTF-8 are
/// skipped with a warning since resource ids are strings.
///
/// Returns the number of items enqueued.
fn enqueue_paths(queue: &PlaybackQueue, paths: &[PathBuf], repeat: u32) -> usize {
    let ids: Vec<&str> = paths
        .iter()
        .filter_map(|path| {
            let id = path.to_str();
            if id.is_none() {
                tracing::warn!(path = ?path, "skipping path that is not valid UTF-8");
            }
            id
        })
        .collect();

    let mut count = 0;
    for _ in 0..repeat {
        for id in &ids {
            if queue.enqueue(PlaybackItem::new(*id)) {
                count += 1;
            }
        }
    }
    count
}

/// Enqueue one item per resource line until EOF, shutdown, or a closed queue.
///
/// Returns the number of items enqueued.
fn enqueue_lines<R: BufRead>(reader: R, queue: &PlaybackQueue, shutdown: &AtomicBool) -> usize {
    let mut count = 0;
    for line in reader.lines() {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!("stdin read error: {e}");
                break;
            }
        };
        let Some(item) = parse_resource_line(&line) else {
            continue;
        };
        if !queue.enqueue(item) {
            break;
        }
        count += 1;
    }
    count
}

/// Parse one input line; blank lines and `#` comments yield `None`.
fn parse_resource_line(line: &str) -> Option<PlaybackItem> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(PlaybackItem::new(trimmed))
}
