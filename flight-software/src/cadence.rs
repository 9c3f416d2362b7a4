//! Fixed-period loop pacing.
//!
//! Each periodic thread measures its own iteration latency and sleeps the
//! remainder of its period. Overruns are reported to the caller (who logs
//! them) but not compensated; the next deadline slips rather than bunching
//! up late iterations.

use std::time::{Duration, Instant};

/// Sleep-until-deadline pacer for one loop.
#[derive(Debug)]
pub struct Cadence {
    period: Duration,
    next_deadline: Instant,
    last_tick: Instant,
}

/// What one wait observed.
#[derive(Debug, Clone, Copy)]
pub struct Tick {
    /// Time since the previous tick [s]
    pub dt: f64,
    /// How far past the deadline this iteration ran, if it overran
    pub overrun: Option<Duration>,
}

impl Cadence {
    pub fn new(period: Duration) -> Self {
        let now = Instant::now();
        Self {
            period,
            next_deadline: now + period,
            last_tick: now,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Block until the next deadline and account for it.
    pub fn wait(&mut self) -> Tick {
        let now = Instant::now();
        let overrun = if now > self.next_deadline {
            Some(now - self.next_deadline)
        } else {
            std::thread::sleep(self.next_deadline - now);
            None
        };

        let tick_at = Instant::now();
        let dt = tick_at.duration_since(self.last_tick).as_secs_f64();
        self.last_tick = tick_at;

        self.next_deadline += self.period;
        if self.next_deadline < tick_at {
            // Slipped by more than a period; restart the schedule from now.
            self.next_deadline = tick_at + self.period;
        }

        Tick { dt, overrun }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_holds_period() {
        let period = Duration::from_millis(10);
        let mut cadence = Cadence::new(period);

        let start = Instant::now();
        for _ in 0..5 {
            let tick = cadence.wait();
            assert!(tick.dt > 0.0);
        }
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(50),
            "5 ticks of 10 ms finished in {elapsed:?}"
        );
    }

    #[test]
    fn test_reports_overrun() {
        let mut cadence = Cadence::new(Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(20));
        let tick = cadence.wait();
        assert!(tick.overrun.is_some());
        // The schedule recovers instead of bunching up missed deadlines.
        let tick = cadence.wait();
        assert!(tick.overrun.is_none());
    }
}
