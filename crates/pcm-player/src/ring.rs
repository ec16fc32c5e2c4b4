//! Bounded staging buffer between the blocking writer and the output callback.
//!
//! The playback thread pushes interleaved `i16` frames with [`OutputRing::push_blocking`];
//! the CPAL callback drains it with [`OutputRing::fill`] without ever waiting.
//!
//! The ring also carries the device run state so the writer can observe underruns:
//!
//! ```text
//! Prepared --first push--> Running --callback starved--> Underrun
//!    ^                        |                             |
//!    +------- drain ----------+------ recover / drain ------+
//! ```

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::DeviceError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum RingState {
    /// Armed; the callback plays silence without flagging starvation.
    Prepared,
    /// Fed by the writer; starvation is an underrun.
    Running,
    /// The callback ran dry while running; writes fail until recovered. Counted as an
    /// underrun only once the writer recovers from it.
    Underrun,
    /// Writer is waiting for buffered frames to play out.
    Draining,
    /// The backend reported a fatal stream error.
    Failed(String),
}

struct RingInner {
    samples: VecDeque<i16>,
    state: RingState,
    /// Callbacks completed since the ring went empty while draining.
    drained_callbacks: u32,
    underruns: u64,
}

/// Thread-safe bounded ring of interleaved `i16` samples plus run state.
pub(crate) struct OutputRing {
    channels: usize,
    capacity_samples: usize,
    inner: Mutex<RingInner>,
    cv: Condvar,
}

impl OutputRing {
    pub(crate) fn new(channels: usize, capacity_frames: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            capacity_samples: capacity_frames.max(1) * channels,
            inner: Mutex::new(RingInner {
                samples: VecDeque::with_capacity(capacity_frames * channels),
                state: RingState::Prepared,
                drained_callbacks: 0,
                underruns: 0,
            }),
            cv: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RingInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> RingState {
        self.lock().state.clone()
    }

    /// Underruns the writer has recovered from.
    pub(crate) fn underruns(&self) -> u64 {
        self.lock().underruns
    }

    pub(crate) fn buffered_frames(&self) -> usize {
        self.lock().samples.len() / self.channels
    }

    /// Push whole frames from `samples`, blocking until at least one frame fits.
    ///
    /// Returns the number of frames accepted, which may be fewer than offered.
    pub(crate) fn push_blocking(&self, samples: &[i16]) -> Result<usize, DeviceError> {
        let offered = samples.len() / self.channels;
        if offered == 0 {
            return Ok(0);
        }

        let mut g = self.lock();
        loop {
            match &g.state {
                RingState::Underrun => return Err(DeviceError::Underrun),
                RingState::Failed(cause) => return Err(DeviceError::Io(cause.clone())),
                _ => {}
            }
            if self.capacity_samples - g.samples.len() >= self.channels {
                break;
            }
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }

        let free_frames = (self.capacity_samples - g.samples.len()) / self.channels;
        let frames = offered.min(free_frames);
        g.samples.extend(&samples[..frames * self.channels]);
        if g.state == RingState::Prepared {
            g.state = RingState::Running;
        }
        drop(g);
        self.cv.notify_all();
        Ok(frames)
    }

    /// Fill an output buffer from the ring, converting each sample with `convert`.
    ///
    /// Missing frames are written as `silence`. Called from the audio callback; never blocks
    /// beyond the ring mutex.
    pub(crate) fn fill<T: Copy>(&self, out: &mut [T], silence: T, convert: impl Fn(i16) -> T) {
        let mut g = self.lock();
        let wanted = out.len() - out.len() % self.channels;
        let available = g.samples.len().min(wanted);

        for (slot, sample) in out.iter_mut().zip(g.samples.drain(..available)) {
            *slot = convert(sample);
        }
        out[available..].fill(silence);

        let inner = &mut *g;
        match inner.state {
            RingState::Running if available < wanted => {
                inner.state = RingState::Underrun;
                tracing::debug!(
                    missing_frames = (wanted - available) / self.channels,
                    "output ring starved"
                );
            }
            RingState::Draining if inner.samples.is_empty() => {
                inner.drained_callbacks = inner.drained_callbacks.saturating_add(1);
            }
            _ => {}
        }
        drop(g);
        self.cv.notify_all();
    }

    /// Re-arm after an underrun, discarding anything left in the ring.
    pub(crate) fn recover(&self) -> Result<(), DeviceError> {
        let mut g = self.lock();
        if let RingState::Failed(cause) = &g.state {
            return Err(DeviceError::Io(cause.clone()));
        }
        if g.state == RingState::Underrun {
            g.underruns += 1;
        }
        g.samples.clear();
        g.state = RingState::Prepared;
        drop(g);
        self.cv.notify_all();
        Ok(())
    }

    /// Block until every buffered frame has been handed to the device and one more
    /// callback has completed, then return to `Prepared`.
    ///
    /// A ring found in `Underrun` ran dry after the writer's last push, which is the
    /// normal end of a stream: it is not counted and still waits for one callback.
    pub(crate) fn drain(&self) -> Result<(), DeviceError> {
        let mut g = self.lock();
        if let RingState::Failed(cause) = &g.state {
            return Err(DeviceError::Io(cause.clone()));
        }
        if g.state == RingState::Prepared && g.samples.is_empty() {
            return Ok(());
        }

        g.state = RingState::Draining;
        g.drained_callbacks = 0;
        loop {
            if let RingState::Failed(cause) = &g.state {
                return Err(DeviceError::Io(cause.clone()));
            }
            if g.samples.is_empty() && g.drained_callbacks > 0 {
                break;
            }
            g = self.cv.wait(g).unwrap_or_else(PoisonError::into_inner);
        }
        g.state = RingState::Prepared;
        Ok(())
    }

    /// Mark the ring failed and wake every waiter.
    pub(crate) fn fail(&self, cause: impl Into<String>) {
        let mut g = self.lock();
        g.state = RingState::Failed(cause.into());
        drop(g);
        self.cv.notify_all();
    }
}
