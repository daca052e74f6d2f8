//! Monotonic time abstraction used to drive the session timers.

use core::time::Duration;

/// Trait implemented by monotonic instant wrappers fed into the sequencer.
///
/// Firmware wraps the executor's instant, the emulator wraps either a
/// simulated offset or the host clock, and tests use plain [`Duration`]
/// offsets.
pub trait MonotonicInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// A [`Duration`] is treated as an offset from an arbitrary epoch.
impl MonotonicInstant for Duration {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.saturating_sub(earlier)
    }
}

/// Clock plus sleep used by the blocking sampling driver.
pub trait Timebase {
    type Instant: MonotonicInstant;

    fn now(&mut self) -> Self::Instant;

    fn sleep(&mut self, duration: Duration);
}

impl<T> Timebase for &mut T
where
    T: Timebase + ?Sized,
{
    type Instant = T::Instant;

    fn now(&mut self) -> Self::Instant {
        (**self).now()
    }

    fn sleep(&mut self, duration: Duration) {
        (**self).sleep(duration);
    }
}

/// Simulated timebase whose sleeps advance the clock instantly.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ManualClock {
    now: Duration,
}

impl ManualClock {
    pub const fn new() -> Self {
        Self {
            now: Duration::ZERO,
        }
    }

    pub const fn starting_at(now: Duration) -> Self {
        Self { now }
    }

    /// Moves the clock forward without sleeping.
    pub fn advance(&mut self, by: Duration) {
        self.now = self.now.saturating_add(by);
    }

    /// Sets the clock, possibly backwards.
    pub fn set(&mut self, now: Duration) {
        self.now = now;
    }

    pub const fn elapsed(&self) -> Duration {
        self.now
    }
}

impl Timebase for ManualClock {
    type Instant = Duration;

    fn now(&mut self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.advance(duration);
    }
}
