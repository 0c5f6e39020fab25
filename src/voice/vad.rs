//! Energy-based voice activity detection.
//!
//! Uses mean absolute amplitude as a simple energy metric. The same value
//! feeds the input-level events shown by the visualizer while listening.

use std::time::{Duration, Instant};

/// Compute the energy level of an audio chunk.
///
/// Returns the mean absolute value of the samples, a simple proxy for
/// signal energy that works well enough for speech/silence discrimination.
pub fn energy(chunk: &[f32]) -> f32 {
    if chunk.is_empty() {
        return 0.0;
    }
    let sum: f32 = chunk.iter().map(|s| s.abs()).sum();
    sum / chunk.len() as f32
}

/// Tracks speech onset and trailing silence across successive chunks.
pub struct UtteranceTracker {
    threshold: f32,
    speech_started: bool,
    last_speech: Option<Instant>,
    started_at: Instant,
}

impl UtteranceTracker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            speech_started: false,
            last_speech: None,
            started_at: Instant::now(),
        }
    }

    /// Feed one chunk. Returns the chunk's energy level.
    pub fn process(&mut self, chunk: &[f32]) -> f32 {
        let level = energy(chunk);
        if level >= self.threshold {
            self.speech_started = true;
            self.last_speech = Some(Instant::now());
        }
        level
    }

    /// Whether any speech has been detected since construction.
    pub fn speech_started(&self) -> bool {
        self.speech_started
    }

    /// True when speech was detected and then followed by at least
    /// `timeout` of silence.
    pub fn utterance_ended(&self, timeout: Duration) -> bool {
        match self.last_speech {
            Some(t) => self.speech_started && t.elapsed() >= timeout,
            None => false,
        }
    }

    /// True when no speech has started within `window` of construction.
    pub fn onset_timed_out(&self, window: Duration) -> bool {
        !self.speech_started && self.started_at.elapsed() >= window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_of_silence_is_zero() {
        assert_eq!(energy(&[0.0; 160]), 0.0);
        assert_eq!(energy(&[]), 0.0);
    }

    #[test]
    fn test_energy_is_mean_abs() {
        let level = energy(&[0.5, -0.5, 0.5, -0.5]);
        assert!((level - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_onset_detection() {
        let mut tracker = UtteranceTracker::new(0.01);
        tracker.process(&[0.001; 160]);
        assert!(!tracker.speech_started());
        tracker.process(&[0.2; 160]);
        assert!(tracker.speech_started());
    }

    #[test]
    fn test_utterance_end_needs_prior_speech() {
        let tracker = UtteranceTracker::new(0.01);
        assert!(!tracker.utterance_ended(Duration::ZERO));
    }

    #[test]
    fn test_utterance_ends_after_silence() {
        let mut tracker = UtteranceTracker::new(0.01);
        tracker.process(&[0.2; 160]);
        std::thread::sleep(Duration::from_millis(15));
        tracker.process(&[0.0; 160]);
        assert!(tracker.utterance_ended(Duration::from_millis(10)));
    }
}
