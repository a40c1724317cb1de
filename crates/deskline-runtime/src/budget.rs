//! Per-request deadline tracking.

use std::time::Duration;

use tokio::time::Instant;

/// How much of the remaining budget the next call asks for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Allocation {
    /// A fixed cap, truncated to what is left.
    Fixed(Duration),
    /// A share of what is left, clamped to `0.0..=1.0`.
    Fraction(f64),
    /// Everything that is left.
    Remaining,
}

/// Wall-clock budget for one request.
///
/// Uses the tokio clock so paused-time tests see the same arithmetic as
/// production.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    total: Duration,
    started_at: Instant,
}

impl Budget {
    pub fn start(total: Duration) -> Self {
        Self {
            total,
            started_at: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Time left; non-increasing, clamps at zero.
    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.elapsed())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining().is_zero()
    }

    /// Allowance for the next external call, net of `margin`.
    ///
    /// `None` when nothing would be left; callers must skip the call then.
    pub fn allocate(&self, request: Allocation, margin: Duration) -> Option<Duration> {
        let remaining = self.remaining();
        let wanted = match request {
            Allocation::Fixed(cap) => cap.min(remaining),
            Allocation::Fraction(f) if f.is_finite() => remaining.mul_f64(f.clamp(0.0, 1.0)),
            Allocation::Fraction(_) => Duration::ZERO,
            Allocation::Remaining => remaining,
        };
        let allowance = wanted.saturating_sub(margin);
        (!allowance.is_zero()).then_some(allowance)
    }
}
