//! Per-session timers
//!
//! Both timers are plain deadline holders driven by the session actor's
//! select loop, so they run on tokio's clock (and on its paused clock in
//! tests). Nothing here is shared between sessions.

use tokio::time::{Duration, Instant};

use crate::error::CaptureError;

/// One tick of the duration tracker
pub const TICK: Duration = Duration::from_secs(1);

/// Forces a segment boundary every `window` of active recording
#[derive(Debug)]
pub struct SegmentTimer {
    window: Duration,
    remaining: Duration,
    deadline: Option<Instant>,
}

impl SegmentTimer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            remaining: window,
            deadline: None,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Arm for a full window starting at `now`
    pub fn arm_fresh(&mut self, now: Instant) -> Result<(), CaptureError> {
        self.remaining = self.window;
        self.arm(now)
    }

    /// Arm for whatever is left of the current window
    pub fn arm(&mut self, now: Instant) -> Result<(), CaptureError> {
        if self.window.is_zero() {
            return Err(CaptureError::TimerSchedulingFailure(
                "segment duration must be greater than zero".to_string(),
            ));
        }

        let deadline = now.checked_add(self.remaining).ok_or_else(|| {
            CaptureError::TimerSchedulingFailure(format!(
                "segment deadline {:?} from now is out of range",
                self.remaining
            ))
        })?;
        self.deadline = Some(deadline);
        Ok(())
    }

    /// Arm the next window right after the deadline that just fired, so
    /// time spent handling the boundary does not stretch the next segment
    pub fn roll_over(&mut self, now: Instant) -> Result<(), CaptureError> {
        let base = self.deadline.unwrap_or(now);
        self.arm_fresh(base)
    }

    /// Disarm, remembering the remainder for `arm`
    pub fn suspend(&mut self, now: Instant) -> Duration {
        if let Some(deadline) = self.deadline.take() {
            self.remaining = deadline.saturating_duration_since(now);
        }
        self.remaining
    }

    /// Disarm and forget the current window
    pub fn cancel(&mut self) {
        self.deadline = None;
        self.remaining = self.window;
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        match self.deadline {
            Some(deadline) => deadline.saturating_duration_since(now),
            None => self.remaining,
        }
    }
}

/// Counts whole seconds of active recording
///
/// Pausing keeps the progress made into the current second, so resuming
/// finishes that second instead of starting a new one. The tracker and
/// the segment timer therefore share one time base.
#[derive(Debug)]
pub struct DurationTracker {
    elapsed: u64,
    next_tick: Option<Instant>,
    until_next: Duration,
}

impl DurationTracker {
    pub fn new() -> Self {
        Self {
            elapsed: 0,
            next_tick: None,
            until_next: TICK,
        }
    }

    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }

    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    pub fn is_running(&self) -> bool {
        self.next_tick.is_some()
    }

    /// Start or resume counting
    pub fn start(&mut self, now: Instant) -> Result<(), CaptureError> {
        let next = now.checked_add(self.until_next).ok_or_else(|| {
            CaptureError::TimerSchedulingFailure("duration tick out of range".to_string())
        })?;
        self.next_tick = Some(next);
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) {
        if let Some(next) = self.next_tick.take() {
            self.until_next = next.saturating_duration_since(now);
        }
    }

    /// Count one second and schedule the next one
    pub fn tick(&mut self) -> u64 {
        self.elapsed += 1;
        self.next_tick = self.next_tick.and_then(|t| t.checked_add(TICK));
        self.elapsed
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for DurationTracker {
    fn default() -> Self {
        Self::new()
    }
}
