//! Time management utilities

use std::time::{Duration, Instant};

/// Convert a millisecond prediction offset into seconds
///
/// The value passes through unchanged, so a negative offset samples poses
/// in the past. Range recovery belongs to `TrackingConfig::sanitized`.
pub fn prediction_offset_secs(prediction_ms: i32) -> f64 {
    f64::from(prediction_ms) * 0.001
}

/// Frame pacer for hosts that drive `update()` at a fixed rate
pub struct FrameTimer {
    frame_budget: Duration,
    last_frame: Instant,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl FrameTimer {
    /// Create a pacer targeting `target_hz` frames per second
    pub fn new(target_hz: u32) -> Self {
        let frame_budget = Duration::from_secs_f64(1.0 / f64::from(target_hz.max(1)));
        Self {
            frame_budget,
            last_frame: Instant::now(),
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Mark the end of a frame, sleeping off whatever is left of its budget
    pub fn end_frame(&mut self) {
        let spent = self.last_frame.elapsed();
        if spent < self.frame_budget {
            std::thread::sleep(self.frame_budget - spent);
        }

        let now = Instant::now();
        self.delta_time = now.duration_since(self.last_frame).as_secs_f32();
        self.total_time += self.delta_time;
        self.last_frame = now;
        self.frame_count += 1;
    }

    /// Time the last frame took, including the pacing sleep
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Number of completed frames
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Average FPS since the pacer was created
    pub fn average_fps(&self) -> f32 {
        if self.total_time > 0.0 {
            self.frame_count as f32 / self.total_time
        } else {
            0.0
        }
    }
}

/// Simple stopwatch for measuring elapsed time
pub struct Stopwatch {
    start_time: Option<Instant>,
    elapsed: Duration,
}

impl Default for Stopwatch {
    fn default() -> Self {
        Self::new()
    }
}

impl Stopwatch {
    /// Create a new stopped stopwatch
    pub fn new() -> Self {
        Self {
            start_time: None,
            elapsed: Duration::ZERO,
        }
    }

    /// Create a new stopwatch and start it immediately
    pub fn start_new() -> Self {
        let mut stopwatch = Self::new();
        stopwatch.start();
        stopwatch
    }

    /// Start the stopwatch
    pub fn start(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Stop the stopwatch and accumulate elapsed time
    pub fn stop(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed += start.elapsed();
        }
    }

    /// Get the elapsed time
    pub fn elapsed(&self) -> Duration {
        self.elapsed + self.start_time.map_or(Duration::ZERO, |start| start.elapsed())
    }

    /// Get the elapsed time in milliseconds
    pub fn elapsed_millis(&self) -> f32 {
        self.elapsed().as_secs_f32() * 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_prediction_offset() {
        assert_relative_eq!(prediction_offset_secs(11), 0.011);
        assert_relative_eq!(prediction_offset_secs(0), 0.0);
        assert_relative_eq!(prediction_offset_secs(-5), -0.005);
    }

    #[test]
    fn test_frame_timer_counts_frames() {
        let mut timer = FrameTimer::new(1000);
        timer.end_frame();
        timer.end_frame();
        assert_eq!(timer.frame_count(), 2);
        assert!(timer.delta_time() > 0.0);
    }

    #[test]
    fn test_stopwatch_accumulates() {
        let mut stopwatch = Stopwatch::start_new();
        std::thread::sleep(Duration::from_millis(5));
        stopwatch.stop();
        let first = stopwatch.elapsed();
        assert!(first >= Duration::from_millis(5));
        assert_eq!(stopwatch.elapsed(), first);
    }
}
