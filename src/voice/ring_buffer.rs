//! Lock-free SPSC ring buffer for microphone samples.
//!
//! Uses the `ringbuf` crate to pass f32 audio from the cpal callback
//! thread to the listening task without locks.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Default capacity: ~10 seconds of 16 kHz mono audio.
const DEFAULT_CAPACITY: usize = 160_000;

/// Producer half, lives in the cpal audio callback.
pub struct MicProducer {
    inner: ringbuf::HeapProd<f32>,
}

/// Consumer half, lives in the listening task.
pub struct MicConsumer {
    inner: ringbuf::HeapCons<f32>,
}

/// Create a matched producer/consumer pair backed by a lock-free ring buffer.
pub fn mic_ring_buffer() -> (MicProducer, MicConsumer) {
    let rb = HeapRb::<f32>::new(DEFAULT_CAPACITY);
    let (prod, cons) = rb.split();
    (MicProducer { inner: prod }, MicConsumer { inner: cons })
}

impl MicProducer {
    /// Push a slice of samples. Returns the number actually written
    /// (less than `samples.len()` when the buffer is full).
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

// Safety: the ringbuf producer is designed to be used from a single thread.
// cpal callbacks run on a dedicated audio thread, so this is fine.
unsafe impl Send for MicProducer {}

impl MicConsumer {
    /// Number of samples currently available for reading.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Drain all available samples into a Vec.
    pub fn drain_all(&mut self) -> Vec<f32> {
        let n = self.available();
        if n == 0 {
            return Vec::new();
        }
        let mut buf = vec![0.0f32; n];
        let read = self.inner.pop_slice(&mut buf);
        buf.truncate(read);
        buf
    }
}

unsafe impl Send for MicConsumer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_returns_pushed_samples() {
        let (mut prod, mut cons) = mic_ring_buffer();
        assert_eq!(prod.push_slice(&[0.1, 0.2, 0.3]), 3);
        let drained = cons.drain_all();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained[2], 0.3);
        assert!(cons.drain_all().is_empty());
    }
}
