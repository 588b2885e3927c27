//! Buffers between the remote session, the interface loops and the device.
//!
//! - [`OutputQueue`]: chunk-level FIFO feeding the output drain loop.
//! - Sample ring: lock-free SPSC `ringbuf::HeapRb<i16>` between the drain
//!   loop's `write` and the real-time playback callback, whose `pop_slice`
//!   is wait-free and allocation-free.

pub mod queue;

pub use queue::{EnqueueOutcome, OutputQueue};

use ringbuf::{traits::Split, HeapRb};

pub use ringbuf::traits::{Consumer, Observer, Producer};

/// Producer half, held by the device writer (drain loop side).
pub type SampleProducer = ringbuf::HeapProd<i16>;

/// Consumer half, held by the playback callback.
pub type SampleConsumer = ringbuf::HeapCons<i16>;

/// Create a matched producer/consumer pair holding `capacity` samples.
pub fn create_sample_ring(capacity: usize) -> (SampleProducer, SampleConsumer) {
    HeapRb::<i16>::new(capacity.max(1)).split()
}

/// Ring capacity for playback: `frames_per_write` samples times four, but at
/// least 200 ms of audio so timer jitter never starves the callback.
pub fn playback_ring_capacity(sample_rate: u32, frames_per_write: usize) -> usize {
    let jitter_floor = (sample_rate as usize) / 5;
    frames_per_write.saturating_mul(4).max(jitter_floor).max(1)
}
