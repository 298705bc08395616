//! [`Clock`] – the single process-wide time source used to stamp records.
//!
//! The backend installs a [`ClockSource`] (a simulator typically reports
//! its own simulated time); until then [`SystemClock`] is used.  [`Clock`]
//! never hands out a stamp smaller than the previous one, even if the
//! source steps backwards.

/// A source of timestamps in an implementation-defined tick unit.
///
/// Any `FnMut() -> u64` closure is a clock source, so the backend can
/// capture whatever context it needs.
pub trait ClockSource {
    fn now(&mut self) -> u64;
}

impl<F> ClockSource for F
where
    F: FnMut() -> u64,
{
    fn now(&mut self) -> u64 {
        self()
    }
}

/// Wall-clock time in microseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl ClockSource for SystemClock {
    fn now(&mut self) -> u64 {
        u64::try_from(chrono::Utc::now().timestamp_micros()).unwrap_or(0)
    }
}

/// Monotonic stamper wrapping the installed [`ClockSource`].
pub struct Clock {
    source: Box<dyn ClockSource>,
    last: u64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(Box::new(SystemClock))
    }
}

impl Clock {
    pub fn new(source: Box<dyn ClockSource>) -> Self {
        Self { source, last: 0 }
    }

    /// Replace the source.  The monotonic floor is kept, so stamps stay
    /// non-decreasing across the switch.
    pub fn set_source(&mut self, source: Box<dyn ClockSource>) {
        self.source = source;
    }

    /// Return the current time, clamped to be at least the last stamp.
    pub fn stamp(&mut self) -> u64 {
        self.last = self.last.max(self.source.now());
        self.last
    }

    /// Stamp `time` in place when it carries no capture time (`0`), and
    /// return the resulting value.
    pub fn stamp_if_unset(&mut self, time: &mut u64) -> u64 {
        if *time == 0 {
            *time = self.stamp();
        }
        *time
    }
}
