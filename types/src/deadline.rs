//! Deadline descriptor handed to idle callbacks.

use std::time::Instant;

/// Remaining-time estimate reported by the fallback timer path, in milliseconds.
///
/// The fallback fires after a timer turn, not inside a real idle window, so it
/// reports a small constant and `did_timeout == true`: callers that branch on
/// remaining time should do the minimum.
pub const FALLBACK_TIME_REMAINING_MS: f64 = 15.0;

/// Source of "now" for a window countdown.
pub type Clock = fn() -> Instant;

#[derive(Debug)]
enum Remaining {
    Fixed(f64),
    Until { end: Instant, clock: Clock },
}

/// Describes the idle window a callback is running in.
///
/// Lent to the callback for the duration of one invocation.
#[derive(Debug)]
pub struct IdleDeadline {
    did_timeout: bool,
    remaining: Remaining,
}

impl IdleDeadline {
    /// Synthetic deadline used when the host has no idle-notification primitive.
    #[must_use]
    pub const fn fallback() -> Self {
        Self {
            did_timeout: true,
            remaining: Remaining::Fixed(FALLBACK_TIME_REMAINING_MS),
        }
    }

    /// A real idle window that closes at `end`.
    #[must_use]
    pub const fn window(end: Instant) -> Self {
        Self::window_with_clock(end, Instant::now)
    }

    /// A window measured against `clock` instead of the system clock, for
    /// hosts that keep their own time.
    #[must_use]
    pub const fn window_with_clock(end: Instant, clock: Clock) -> Self {
        Self {
            did_timeout: false,
            remaining: Remaining::Until { end, clock },
        }
    }

    /// The callback's timeout hint expired before an idle window opened.
    #[must_use]
    pub const fn timed_out() -> Self {
        Self {
            did_timeout: true,
            remaining: Remaining::Fixed(0.0),
        }
    }

    /// Whether the callback is running because its timeout elapsed.
    #[must_use]
    pub const fn did_timeout(&self) -> bool {
        self.did_timeout
    }

    /// Estimated idle time left in the current window, in fractional milliseconds.
    #[must_use]
    pub fn time_remaining(&self) -> f64 {
        match self.remaining {
            Remaining::Fixed(ms) => ms,
            Remaining::Until { end, clock } => {
                end.saturating_duration_since(clock()).as_secs_f64() * 1000.0
            }
        }
    }
}
