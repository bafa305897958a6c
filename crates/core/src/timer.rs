//! Frame clock for the main loop.

use std::time::{Duration, Instant};

/// A stalled loop (window drag, debugger) advances animation by at most this.
pub const MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

#[derive(Debug)]
pub struct Timer {
    started: Instant,
    previous: Instant,
    frames: u64,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            previous: now,
            frames: 0,
        }
    }

    /// Time since the last tick, capped at [`MAX_FRAME_DELTA`]. Counts a frame.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now.saturating_duration_since(self.previous);
        self.previous = now;
        self.frames += 1;
        delta.min(MAX_FRAME_DELTA)
    }

    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Frames per second since creation or the last reset.
    pub fn average_fps(&self) -> f32 {
        let secs = self.started.elapsed().as_secs_f32();
        if secs > f32::EPSILON {
            self.frames as f32 / secs
        } else {
            0.0
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_counts_frames() {
        let mut timer = Timer::new();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count(), 2);
        timer.reset();
        assert_eq!(timer.frame_count(), 0);
    }

    #[test]
    fn test_tick_is_clamped() {
        let mut timer = Timer::new();
        let Some(past) = Instant::now().checked_sub(Duration::from_secs(5)) else {
            return;
        };
        timer.previous = past;
        assert_eq!(timer.tick(), MAX_FRAME_DELTA);
    }

    #[test]
    fn test_fps_before_any_time_passes() {
        let timer = Timer::new();
        assert!(timer.average_fps() >= 0.0);
    }
}
