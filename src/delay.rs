//! Simulated work durations.

use std::{thread, time::Duration};

use rand::Rng;

/// A source of durations that stand in for real work.
///
/// Producers and consumers each own one, and sleep for [`DelaySource::next_delay`] before every
/// item. Closures returning a [`Duration`] are delay sources too, which lets tests script exact
/// timings.
pub trait DelaySource {
    fn next_delay(&mut self) -> Duration;

    /// Sleeps the calling thread for the next delay.
    fn pause(&mut self) {
        let delay = self.next_delay();
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

impl<F: FnMut() -> Duration> DelaySource for F {
    fn next_delay(&mut self) -> Duration {
        self()
    }
}

/// A uniformly distributed delay in `min..=max`.
///
/// A range with `min == max` always yields that exact duration and never touches the RNG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayRange {
    min: Duration,
    max: Duration,
}

impl DelayRange {
    /// Creates a range from `min` to `max` (inclusive).
    ///
    /// # Panics
    ///
    /// Panics if `min > max`.
    pub fn new(min: Duration, max: Duration) -> Self {
        assert!(min <= max, "delay range {min:?}..={max:?} is empty");
        Self { min, max }
    }

    /// A range that always yields `delay`.
    pub const fn fixed(delay: Duration) -> Self {
        Self {
            min: delay,
            max: delay,
        }
    }

    /// A range that yields no delay at all.
    pub const ZERO: DelayRange = DelayRange::fixed(Duration::ZERO);

    pub fn min(&self) -> Duration {
        self.min
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl DelaySource for DelayRange {
    fn next_delay(&mut self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        rand::thread_rng().gen_range(self.min..=self.max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_stays_in_bounds() {
        let mut range = DelayRange::new(Duration::from_millis(500), Duration::from_millis(1000));
        for _ in 0..1000 {
            let d = range.next_delay();
            assert!(d >= range.min() && d <= range.max(), "{d:?} out of range");
        }
    }

    #[test]
    fn fixed_range() {
        let mut range = DelayRange::fixed(Duration::from_millis(3));
        assert_eq!(range.next_delay(), Duration::from_millis(3));
        let mut zero = DelayRange::ZERO;
        assert_eq!(zero.next_delay(), Duration::ZERO);
    }

    #[test]
    #[should_panic = "is empty"]
    fn inverted_range_panics() {
        DelayRange::new(Duration::from_secs(2), Duration::from_secs(1));
    }

    #[test]
    fn closure_source() {
        let mut n = 0;
        let mut source = || {
            n += 1;
            Duration::from_millis(n)
        };
        assert_eq!(source.next_delay(), Duration::from_millis(1));
        assert_eq!(source.next_delay(), Duration::from_millis(2));
    }
}
