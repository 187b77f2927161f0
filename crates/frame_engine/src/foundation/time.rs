//! Time management utilities

use std::time::{Duration, Instant};

/// Wall-clock frame timer with pause support
///
/// `total_time` excludes time spent stopped, so gameplay driven by it does not
/// jump forward after a pause.
pub struct GameTimer {
    base_time: Instant,
    prev_time: Instant,
    stop_time: Option<Instant>,
    paused: Duration,
    delta_time: f32,
    frame_count: u64,
    simulated_total: Option<f32>,
}

impl Default for GameTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl GameTimer {
    /// Create a new running timer
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            base_time: now,
            prev_time: now,
            stop_time: None,
            paused: Duration::ZERO,
            delta_time: 0.0,
            frame_count: 0,
            simulated_total: None,
        }
    }

    /// Reset to a running state with zero elapsed time
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Resume after `stop`
    pub fn start(&mut self) {
        if let Some(stopped_at) = self.stop_time.take() {
            let now = Instant::now();
            self.paused += now.duration_since(stopped_at);
            self.prev_time = now;
        }
    }

    /// Pause the timer
    pub fn stop(&mut self) {
        if self.stop_time.is_none() {
            self.stop_time = Some(Instant::now());
        }
    }

    /// Whether the timer is currently paused
    pub fn is_stopped(&self) -> bool {
        self.stop_time.is_some()
    }

    /// Advance by wall-clock time (call once per frame)
    pub fn tick(&mut self) {
        if self.stop_time.is_some() {
            self.delta_time = 0.0;
            return;
        }

        let now = Instant::now();
        // Instant is monotonic, but guard against zero-length frames anyway.
        self.delta_time = now.duration_since(self.prev_time).as_secs_f32().max(0.0);
        self.prev_time = now;
        self.frame_count += 1;
    }

    /// Advance by a fixed step instead of reading the clock
    pub fn tick_with(&mut self, delta_time: f32) {
        if self.stop_time.is_some() {
            self.delta_time = 0.0;
            return;
        }

        self.delta_time = delta_time.max(0.0);
        let total = self.simulated_total.unwrap_or(0.0) + self.delta_time;
        self.simulated_total = Some(total);
        self.frame_count += 1;
    }

    /// Get the time since the last tick in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total running time in seconds, excluding paused time
    pub fn total_time(&self) -> f32 {
        if let Some(total) = self.simulated_total {
            return total;
        }

        let end = self.stop_time.unwrap_or_else(Instant::now);
        let paused = self.paused.as_secs_f32();
        (end.duration_since(self.base_time).as_secs_f32() - paused).max(0.0)
    }

    /// Get the current frame count
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Get the current FPS (based on last frame time)
    pub fn current_fps(&self) -> f32 {
        if self.delta_time > 0.0 {
            1.0 / self.delta_time
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_fixed_step_accumulates() {
        let mut timer = GameTimer::new();
        timer.tick_with(0.5);
        timer.tick_with(0.25);

        assert_relative_eq!(timer.delta_time(), 0.25);
        assert_relative_eq!(timer.total_time(), 0.75);
        assert_eq!(timer.frame_count(), 2);
        assert_relative_eq!(timer.current_fps(), 4.0);
    }

    #[test]
    fn test_stopped_timer_does_not_advance() {
        let mut timer = GameTimer::new();
        timer.tick_with(1.0);
        timer.stop();
        timer.tick_with(1.0);

        assert!(timer.is_stopped());
        assert_relative_eq!(timer.delta_time(), 0.0);
        assert_relative_eq!(timer.total_time(), 1.0);

        timer.start();
        timer.tick_with(0.5);
        assert_relative_eq!(timer.total_time(), 1.5);
    }

    #[test]
    fn test_negative_step_is_clamped() {
        let mut timer = GameTimer::new();
        timer.tick_with(-3.0);
        assert_relative_eq!(timer.delta_time(), 0.0);
    }
}
