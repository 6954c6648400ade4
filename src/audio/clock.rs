// Audio clock - Sample position shared between the render callback and the scheduler
//
// The render side advances the position once per buffer; the scheduler reads it
// to know "now" in audio time and converts note times into absolute sample
// positions.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Shared audio clock, counted in rendered frames
#[derive(Clone, Debug)]
pub struct AudioClock {
    /// Frames rendered since the stream started (incremented by the render callback)
    sample_position: Arc<AtomicU64>,
    sample_rate: f64,
}

impl AudioClock {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_position: Arc::new(AtomicU64::new(0)),
            sample_rate: sample_rate as f64,
        }
    }

    /// Current frame position (called from the scheduler thread)
    pub fn current_sample(&self) -> u64 {
        self.sample_position.load(Ordering::Acquire)
    }

    /// Advance by one rendered buffer (called from the render callback)
    pub fn advance(&self, frames: usize) {
        self.sample_position
            .fetch_add(frames as u64, Ordering::AcqRel);
    }

    /// Current audio time in seconds
    pub fn seconds(&self) -> f64 {
        self.samples_to_seconds(self.current_sample())
    }

    /// Absolute sample position of a time in seconds (rounded to the nearest frame)
    pub fn seconds_to_samples(&self, seconds: f64) -> u64 {
        if seconds <= 0.0 {
            return 0;
        }
        (seconds * self.sample_rate).round() as u64
    }

    pub fn samples_to_seconds(&self, samples: u64) -> f64 {
        samples as f64 / self.sample_rate
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_creation() {
        let clock = AudioClock::new(48000.0);
        assert_eq!(clock.current_sample(), 0);
        assert_eq!(clock.sample_rate(), 48000.0);
        assert_eq!(clock.seconds(), 0.0);
    }

    #[test]
    fn test_advance_is_shared_between_clones() {
        let clock = AudioClock::new(48000.0);
        let render_side = clock.clone();
        render_side.advance(480);
        render_side.advance(480);
        assert_eq!(clock.current_sample(), 960);
        assert!((clock.seconds() - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_seconds_to_samples() {
        let clock = AudioClock::new(48000.0);
        assert_eq!(clock.seconds_to_samples(1.0), 48000);
        // 125ms step at 48kHz
        assert_eq!(clock.seconds_to_samples(0.125), 6000);
        // 10ms ramp
        assert_eq!(clock.seconds_to_samples(0.010), 480);
        // Times before the stream origin clamp to 0
        assert_eq!(clock.seconds_to_samples(-0.5), 0);
    }

    #[test]
    fn test_rounding_to_nearest_frame() {
        let clock = AudioClock::new(44100.0);
        // 1/3 s = 14700 frames exactly, but float math lands just below
        assert_eq!(clock.seconds_to_samples(1.0 / 3.0), 14700);
        assert_eq!(clock.samples_to_seconds(44100), 1.0);
    }
}
