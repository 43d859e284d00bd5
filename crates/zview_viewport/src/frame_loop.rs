//! Frame scheduling for the render loop.
//!
//! The window's event loop sleeps until [`FrameLoop::next_deadline`], then
//! requests a redraw; each redraw calls [`FrameLoop::begin_frame`] to get the
//! animation clock and push the deadline one interval further.

use std::time::{Duration, Instant};

/// Default delay between frames.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone)]
pub struct FrameLoop {
    interval: Duration,
    started: Instant,
    next_frame: Instant,
    cancelled: bool,
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_INTERVAL)
    }
}

impl FrameLoop {
    /// Start a loop now; the first frame is due immediately.
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(Instant::now(), interval)
    }

    pub fn starting_at(started: Instant, interval: Duration) -> Self {
        Self {
            interval,
            started,
            next_frame: started,
            cancelled: false,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the next frame should run, or `None` once cancelled.
    pub fn next_deadline(&self) -> Option<Instant> {
        (!self.cancelled).then_some(self.next_frame)
    }

    pub fn is_due(&self, now: Instant) -> bool {
        !self.cancelled && now >= self.next_frame
    }

    /// Start a frame at `now`: returns the seconds since the loop started and
    /// schedules the next frame one interval later.
    pub fn begin_frame(&mut self, now: Instant) -> Option<f64> {
        if self.cancelled {
            return None;
        }

        self.next_frame = now + self.interval;
        Some(now.saturating_duration_since(self.started).as_secs_f64())
    }

    /// Stop scheduling frames. Cannot be undone.
    pub fn cancel(&mut self) {
        if !self.cancelled {
            log::debug!("Frame loop cancelled");
        }
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_frame_is_due_immediately() {
        let start = Instant::now();
        let frames = FrameLoop::starting_at(start, DEFAULT_FRAME_INTERVAL);

        assert!(frames.is_due(start));
        assert_eq!(frames.next_deadline(), Some(start));
    }

    #[test]
    fn test_begin_frame_reschedules() {
        let start = Instant::now();
        let mut frames = FrameLoop::starting_at(start, Duration::from_millis(10));

        let later = start + Duration::from_millis(250);
        let elapsed = frames.begin_frame(later).unwrap();

        assert!((elapsed - 0.25).abs() < 1e-9);
        assert_eq!(frames.next_deadline(), Some(later + Duration::from_millis(10)));
        assert!(!frames.is_due(later + Duration::from_millis(5)));
        assert!(frames.is_due(later + Duration::from_millis(10)));
    }

    #[test]
    fn test_cancel_stops_frames() {
        let start = Instant::now();
        let mut frames = FrameLoop::starting_at(start, DEFAULT_FRAME_INTERVAL);
        frames.cancel();

        assert!(frames.is_cancelled());
        assert!(frames.next_deadline().is_none());
        assert!(!frames.is_due(start + Duration::from_secs(1)));
        assert!(frames.begin_frame(start + Duration::from_secs(1)).is_none());
    }
}
