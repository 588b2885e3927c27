//! Raw PCM chunk exchanged between the remote session, the queues and the device.

/// A contiguous block of 16-bit signed little-endian mono PCM.
///
/// Chunks are immutable once built. Ownership moves through the pipeline so
/// each chunk is consumed exactly once (a playback write or a classification
/// step); transformations produce a new chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AudioChunk {
    bytes: Vec<u8>,
}

impl AudioChunk {
    /// Wrap raw PCM bytes as received from the wire or the device.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Encode samples as little-endian PCM.
    pub fn from_samples(samples: &[i16]) -> Self {
        let mut bytes = Vec::with_capacity(samples.len() * 2);
        for s in samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Byte length, including a trailing partial sample if present.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Number of complete samples.
    pub fn sample_count(&self) -> usize {
        self.bytes.len() / 2
    }

    /// Trailing byte that does not form a full sample, if any.
    pub fn partial_tail(&self) -> Option<u8> {
        if self.bytes.len() % 2 == 1 {
            self.bytes.last().copied()
        } else {
            None
        }
    }

    /// Iterate complete samples in order.
    pub fn samples(&self) -> impl Iterator<Item = i16> + '_ {
        self.bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
    }

    /// Decode to a sample vector.
    pub fn to_samples(&self) -> Vec<i16> {
        self.samples().collect()
    }

    /// Append samples normalized to [-1.0, 1.0) onto `out`.
    pub fn extend_normalized(&self, out: &mut Vec<f32>) {
        out.extend(self.samples().map(|s| s as f32 / 32768.0));
    }

    /// Playback duration at `sample_rate`, in milliseconds.
    pub fn duration_ms(&self, sample_rate: u32) -> f64 {
        if sample_rate == 0 {
            return 0.0;
        }
        self.sample_count() as f64 * 1000.0 / sample_rate as f64
    }
}

impl From<Vec<u8>> for AudioChunk {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}
