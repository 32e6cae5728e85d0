//! Frame clock for delta time and frame-rate reporting.

use std::time::{Duration, Instant};

/// Weight of the newest sample in the smoothed frame time.
const SMOOTHING: f64 = 0.1;

/// Measures time between frames.
///
/// Besides the raw delta, the clock keeps an exponentially smoothed frame
/// time and tells the caller when a reporting interval has elapsed, so the
/// render loop can log its frame rate without flooding the output.
#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_tick: Instant,
    last_report: Instant,
    report_interval: Duration,
    smoothed_secs: f64,
    frames: u64,
}

impl FrameClock {
    /// Creates a clock that reports once per `report_interval`.
    pub fn new(report_interval: Duration) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            last_report: now,
            report_interval,
            smoothed_secs: 0.0,
            frames: 0,
        }
    }

    /// Records a frame boundary and returns the time since the previous one.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.record(delta);
        delta
    }

    fn record(&mut self, delta: Duration) {
        let secs = delta.as_secs_f64();
        self.smoothed_secs = if self.frames == 0 {
            secs
        } else {
            self.smoothed_secs + SMOOTHING * (secs - self.smoothed_secs)
        };
        self.frames += 1;
    }

    /// Total time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Number of ticks recorded so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Smoothed frame time in milliseconds.
    pub fn frame_time_ms(&self) -> f64 {
        self.smoothed_secs * 1000.0
    }

    /// Smoothed frames per second, or zero before the first tick.
    pub fn fps(&self) -> f64 {
        if self.smoothed_secs > 0.0 {
            1.0 / self.smoothed_secs
        } else {
            0.0
        }
    }

    /// Returns true once per reporting interval.
    pub fn should_report(&mut self) -> bool {
        if self.last_report.elapsed() >= self.report_interval {
            self.last_report = Instant::now();
            true
        } else {
            false
        }
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_sample_seeds_average() {
        let mut clock = FrameClock::default();
        clock.record(Duration::from_millis(20));
        assert_eq!(clock.frames(), 1);
        assert!((clock.frame_time_ms() - 20.0).abs() < 1e-9);
        assert!((clock.fps() - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_average_moves_towards_new_samples() {
        let mut clock = FrameClock::default();
        clock.record(Duration::from_millis(10));
        clock.record(Duration::from_millis(20));
        let ms = clock.frame_time_ms();
        assert!(ms > 10.0 && ms < 20.0);
    }

    #[test]
    fn test_fps_is_zero_before_first_tick() {
        let clock = FrameClock::default();
        assert_eq!(clock.fps(), 0.0);
    }

    #[test]
    fn test_zero_interval_always_reports() {
        let mut clock = FrameClock::new(Duration::ZERO);
        assert!(clock.should_report());
        assert!(clock.should_report());
    }
}
