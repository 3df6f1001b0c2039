//! Thread-safe hand-off between speech synthesis and the real-time audio pull.
//!
//! Synthesis pushes whole chunks from whatever thread it runs on, at whatever
//! cadence the engine produces them. The host pulls a bounded number of frames
//! from its real-time thread and must never be made to wait, so a pull that
//! finds the queue busy or short simply returns less.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, MutexGuard, TryLockError},
    time::Duration,
};

/// A mono sample as a 16-bit signed integer.
pub type Sample = i16;

/// A contiguous burst of synthesized audio tagged with its sample rate.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    pub samples: Vec<Sample>,
    pub sample_rate: u32,
}

impl AudioChunk {
    pub fn new(samples: Vec<Sample>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration of this chunk at its own sample rate.
    pub fn duration(&self) -> Duration {
        frames_to_duration(self.samples.len(), self.sample_rate)
    }
}

/// Result of a single pull.
///
/// `sample_rate` is `None` only when no frames were returned.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PulledAudio {
    pub samples: Vec<Sample>,
    pub sample_rate: Option<u32>,
}

impl PulledAudio {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Cumulative counters, for diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub pushed_frames: u64,
    pub pulled_frames: u64,
    pub underruns: u64,
}

#[derive(Default)]
struct ChunkQueue {
    chunks: VecDeque<AudioChunk>,
    /// Read offset into the front chunk. Chunks themselves are never modified.
    head_position: usize,
    buffered_frames: usize,
    stats: BridgeStats,
}

impl ChunkQueue {
    fn push(&mut self, chunk: AudioChunk) {
        self.buffered_frames += chunk.len();
        self.stats.pushed_frames += chunk.len() as u64;
        self.chunks.push_back(chunk);
    }

    fn pull(&mut self, max_frames: usize) -> PulledAudio {
        let mut samples = Vec::with_capacity(max_frames.min(self.buffered_frames));
        let mut sample_rate = None;

        while samples.len() < max_frames {
            let Some(chunk) = self.chunks.front() else {
                break;
            };

            // One pull carries one rate, stop at the boundary
            if sample_rate.is_some_and(|rate| rate != chunk.sample_rate) {
                break;
            }
            sample_rate = Some(chunk.sample_rate);

            let remaining = &chunk.samples[self.head_position..];
            let to_read = remaining.len().min(max_frames - samples.len());
            samples.extend_from_slice(&remaining[..to_read]);
            self.head_position += to_read;

            let exhausted = self.head_position >= chunk.samples.len();
            if exhausted {
                self.chunks.pop_front();
                self.head_position = 0;
            }
        }

        self.buffered_frames -= samples.len();
        self.stats.pulled_frames += samples.len() as u64;
        // Short because the queue ran dry, not because of a rate boundary
        if samples.len() < max_frames && self.chunks.is_empty() {
            self.stats.underruns += 1;
        }

        PulledAudio {
            samples,
            sample_rate,
        }
    }

    fn backlog(&self) -> Duration {
        let mut chunks = self.chunks.iter();
        let head = chunks.next().map(|chunk| {
            frames_to_duration(chunk.len() - self.head_position, chunk.sample_rate)
        });

        head.into_iter()
            .chain(chunks.map(AudioChunk::duration))
            .sum()
    }

    fn clear(&mut self) {
        self.chunks.clear();
        self.head_position = 0;
        self.buffered_frames = 0;
    }
}

/// Unbounded FIFO of [AudioChunk]s shared between any number of producers
/// and a single real-time consumer.
#[derive(Clone, Default)]
pub struct AudioBridge {
    queue: Arc<Mutex<ChunkQueue>>,
}

impl AudioBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Callable from any thread. Empty chunks are ignored.
    pub fn push(&self, samples: Vec<Sample>, sample_rate: u32) {
        self.push_chunk(AudioChunk::new(samples, sample_rate));
    }

    pub fn push_chunk(&self, chunk: AudioChunk) {
        if chunk.is_empty() {
            return;
        }

        trace!(
            "Queueing {} frames at {} Hz",
            chunk.len(),
            chunk.sample_rate
        );
        self.lock().push(chunk);
    }

    /// Drain up to `max_frames` frames in FIFO order, crossing chunk
    /// boundaries as needed.
    ///
    /// Never waits: returns fewer frames (possibly none) on underrun, when
    /// the next chunk has a different sample rate, or when a producer holds
    /// the queue at this instant.
    pub fn pull(&self, max_frames: usize) -> PulledAudio {
        let mut queue = match self.queue.try_lock() {
            Ok(queue) => queue,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return PulledAudio::default(),
        };

        queue.pull(max_frames)
    }

    /// Drop everything still buffered.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn buffered_frames(&self) -> usize {
        self.lock().buffered_frames
    }

    /// Playback time of everything still buffered, each chunk at its own rate.
    pub fn backlog(&self) -> Duration {
        self.lock().backlog()
    }

    /// Rate of the audio the next pull would return.
    pub fn next_sample_rate(&self) -> Option<u32> {
        self.lock().chunks.front().map(|chunk| chunk.sample_rate)
    }

    /// Like [AudioBridge::next_sample_rate], but never waits: `None` when a
    /// producer holds the queue at this instant.
    pub fn try_next_sample_rate(&self) -> Option<Option<u32>> {
        let queue = match self.queue.try_lock() {
            Ok(queue) => queue,
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
            Err(TryLockError::WouldBlock) => return None,
        };

        Some(queue.chunks.front().map(|chunk| chunk.sample_rate))
    }

    /// Runs `f` while holding the queue, as a busy producer would.
    #[cfg(test)]
    pub(crate) fn with_queue_held<R>(&self, f: impl FnOnce() -> R) -> R {
        let _queue = self.lock();
        f()
    }

    pub fn stats(&self) -> BridgeStats {
        self.lock().stats
    }

    fn lock(&self) -> MutexGuard<'_, ChunkQueue> {
        match self.queue.lock() {
            Ok(queue) => queue,
            Err(e) => e.into_inner(),
        }
    }
}

fn frames_to_duration(frames: usize, sample_rate: u32) -> Duration {
    if sample_rate == 0 {
        return Duration::ZERO;
    }

    Duration::from_secs_f64(frames as f64 / sample_rate as f64)
}
