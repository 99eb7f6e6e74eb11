//! Frame clock feeding the update and render ticks.

use std::time::{Duration, Instant};

/// One reading of the [`FrameClock`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTime {
    /// Time since the previous tick.
    pub delta: Duration,
    /// Time since the clock started.
    pub since_start: Duration,
    /// Ticks before this one.
    pub index: u64,
}

impl FrameTime {
    #[inline]
    pub fn delta_secs(&self) -> f32 {
        self.delta.as_secs_f32()
    }

    #[inline]
    pub fn app_secs(&self) -> f32 {
        self.since_start.as_secs_f32()
    }
}

#[derive(Debug)]
pub struct FrameClock {
    start: Instant,
    last_tick: Instant,
    ticks: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(start: Instant) -> Self {
        Self {
            start,
            last_tick: start,
            ticks: 0,
        }
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    /// A `now` earlier than the previous tick reads as a zero delta.
    fn tick_at(&mut self, now: Instant) -> FrameTime {
        let time = FrameTime {
            delta: now.saturating_duration_since(self.last_tick),
            since_start: now.saturating_duration_since(self.start),
            index: self.ticks,
        };
        self.last_tick = now.max(self.last_tick);
        self.ticks += 1;
        time
    }

    #[inline]
    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deltas_are_measured_between_ticks() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);

        let first = clock.tick_at(start + Duration::from_millis(16));
        assert_eq!(first.delta, Duration::from_millis(16));
        assert_eq!(first.index, 0);

        let second = clock.tick_at(start + Duration::from_millis(40));
        assert_eq!(second.delta, Duration::from_millis(24));
        assert_eq!(second.since_start, Duration::from_millis(40));
        assert_eq!(second.index, 1);
        assert_eq!(clock.ticks(), 2);
    }

    #[test]
    fn out_of_order_instant_gives_zero_delta() {
        let start = Instant::now();
        let mut clock = FrameClock::starting_at(start);
        clock.tick_at(start + Duration::from_millis(10));

        let late = clock.tick_at(start + Duration::from_millis(5));
        assert_eq!(late.delta, Duration::ZERO);
        let next = clock.tick_at(start + Duration::from_millis(12));
        assert_eq!(next.delta, Duration::from_millis(2));
    }
}
