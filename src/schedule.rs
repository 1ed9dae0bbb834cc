//! Recompute and render scheduling.
//!
//! Two independent gates decouple the three cadences in play: record
//! arrival, recomputation, and rendering. [`UpdateThrottle`] coalesces
//! bursty arrivals into bounded-rate recomputes (leading + trailing: the
//! first trigger in an idle period fires immediately, rapid followers
//! collapse into one deferred fire). [`RenderGate`] rate-limits the more
//! expensive downstream redraw at a coarser interval.
//!
//! Both take their notion of "now" from a [`Clock`] so the coalescing logic
//! is testable without wall-clock timers.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Recompute throttle interval.
pub const UPDATE_THROTTLE: Duration = Duration::from_millis(2000);

/// Render gate interval.
pub const RENDER_INTERVAL: Duration = Duration::from_millis(3000);

/// Source of the current instant.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A hand-advanced clock for tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    /// Move time forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Outcome of offering an arrival to the throttle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// The gate was open: run the recompute now.
    RunNow,
    /// The gate was closed and nothing was pending: a trailing fire is now
    /// scheduled for `until`.
    Deferred { until: Instant },
    /// A trailing fire was already pending; this arrival rides along.
    Coalesced,
}

/// Leading + trailing throttle over recompute triggers.
///
/// Explicitly a two-state machine, `Idle` or `Pending { deadline }`, with
/// transitions on arrival, timer fire, and reset. An immediate run clears
/// any pending deadline, so a deferred fire that was superseded becomes a
/// no-op without being actively canceled.
#[derive(Debug)]
pub struct UpdateThrottle<C: Clock> {
    interval: Duration,
    last_update: Option<Instant>,
    pending: Option<Instant>,
    clock: C,
}

impl<C: Clock> UpdateThrottle<C> {
    pub fn new(interval: Duration, clock: C) -> Self {
        Self {
            interval,
            last_update: None,
            pending: None,
            clock,
        }
    }

    /// Offer one arrival to the throttle.
    pub fn on_arrival(&mut self) -> ThrottleDecision {
        let now = self.clock.now();
        match self.last_update {
            Some(last) if now.duration_since(last) < self.interval => {
                if self.pending.is_none() {
                    let until = last + self.interval;
                    self.pending = Some(until);
                    ThrottleDecision::Deferred { until }
                } else {
                    ThrottleDecision::Coalesced
                }
            }
            _ => {
                self.last_update = Some(now);
                self.pending = None;
                ThrottleDecision::RunNow
            }
        }
    }

    /// True exactly when a pending trailing fire has come due; the caller
    /// runs the recompute. Fires at most once per deferral.
    pub fn fire_due(&mut self) -> bool {
        match self.pending {
            Some(deadline) if self.clock.now() >= deadline => {
                self.pending = None;
                self.last_update = Some(self.clock.now());
                true
            }
            _ => false,
        }
    }

    /// Open the gate so the next trigger runs unthrottled. Used when the
    /// window length changes and a forced recompute has just run.
    pub fn reset(&mut self) {
        self.last_update = None;
    }

    /// Whether a trailing fire is currently scheduled.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Coarser edge-triggered gate for render passes.
#[derive(Debug)]
pub struct RenderGate<C: Clock> {
    interval: Duration,
    last_render: Option<Instant>,
    clock: C,
}

impl<C: Clock> RenderGate<C> {
    pub fn new(interval: Duration, clock: C) -> Self {
        Self {
            interval,
            last_render: None,
            clock,
        }
    }

    /// True at most once per interval, regardless of how often it is asked.
    pub fn should_render(&mut self) -> bool {
        let now = self.clock.now();
        let due = match self.last_render {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if due {
            self.last_render = Some(now);
        }
        due
    }
}
