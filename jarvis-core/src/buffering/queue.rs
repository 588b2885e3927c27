//! Bounded FIFO of outbound agent audio.
//!
//! Producers (the remote session's network thread) must never stall, so
//! `enqueue` is non-blocking and drops the *new* chunk when the queue is full.
//! The drain loop blocks in `drain_one` with a timeout so it can observe the
//! stop flag promptly.
//!
//! `enqueue`, `clear` and `drain_one` all take the same lock: a clear can never
//! interleave with a half-finished enqueue. A chunk already handed out by
//! `drain_one` is in flight until `finish_one` and is not affected by a later
//! `clear`.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::audio::chunk::AudioChunk;

/// Result of a single `enqueue` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Queue was at capacity; the chunk was discarded.
    Dropped,
    /// Queue is closed (interface stopped); the chunk was discarded.
    Closed,
}

struct QueueInner {
    chunks: VecDeque<AudioChunk>,
    open: bool,
    in_flight: bool,
}

pub struct OutputQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl OutputQueue {
    /// Create a closed queue holding at most `capacity` chunks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(QueueInner {
                chunks: VecDeque::with_capacity(capacity),
                open: false,
                in_flight: false,
            }),
            available: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Accept chunks again, discarding anything left from a previous session.
    pub fn open(&self) {
        let mut inner = self.inner.lock();
        inner.chunks.clear();
        inner.open = true;
        inner.in_flight = false;
        self.dropped.store(0, Ordering::Relaxed);
    }

    /// Stop accepting chunks and wake any waiting consumer.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.open = false;
        inner.chunks.clear();
        inner.in_flight = false;
        drop(inner);
        self.available.notify_all();
    }

    pub fn is_open(&self) -> bool {
        self.inner.lock().open
    }

    pub fn enqueue(&self, chunk: AudioChunk) -> EnqueueOutcome {
        let mut inner = self.inner.lock();
        if !inner.open {
            return EnqueueOutcome::Closed;
        }
        if inner.chunks.len() >= self.capacity {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return EnqueueOutcome::Dropped;
        }
        inner.chunks.push_back(chunk);
        drop(inner);
        self.available.notify_one();
        EnqueueOutcome::Queued
    }

    /// Pop the oldest chunk, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout or when the queue is closed while waiting.
    /// A returned chunk counts as in flight until [`finish_one`](Self::finish_one).
    pub fn drain_one(&self, timeout: Duration) -> Option<AudioChunk> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        loop {
            if let Some(chunk) = inner.chunks.pop_front() {
                inner.in_flight = true;
                return Some(chunk);
            }
            if !inner.open {
                return None;
            }
            if self
                .available
                .wait_until(&mut inner, deadline)
                .timed_out()
            {
                let chunk = inner.chunks.pop_front();
                inner.in_flight = chunk.is_some();
                return chunk;
            }
        }
    }

    /// The chunk from the last `drain_one` has been written (or given up on).
    pub fn finish_one(&self) {
        self.inner.lock().in_flight = false;
    }

    /// Whether anything is queued or still being written.
    pub fn has_pending(&self) -> bool {
        let inner = self.inner.lock();
        inner.in_flight || !inner.chunks.is_empty()
    }

    /// Discard every buffered chunk. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.chunks.len();
        inner.chunks.clear();
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().chunks.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Chunks discarded because the queue was full since the last `open`.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for OutputQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
