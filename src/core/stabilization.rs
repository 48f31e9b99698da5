//! Stabilization timing.

use std::time::{Duration, Instant};

pub const DEFAULT_STABILIZE_INTERVAL: Duration = Duration::from_secs(30);

/// Stabilization state
#[derive(Debug)]
pub struct Stabilizer {
    interval: Duration,
    last_round: Instant,
    /// Next successor wedge to refresh.
    next_finger: usize,
    bits: usize,
    rounds: u64,
}

/// Decisions for one stabilization tick
#[derive(Debug, PartialEq, Eq)]
pub struct StabilizationDecisions {
    /// Whether to check the successor's predecessor and notify the successor
    pub should_stabilize: bool,

    /// Successor wedge to refresh this round
    pub finger_to_fix: Option<usize>,

    /// Whether to ping the predecessor
    pub should_check_predecessor: bool,

    /// Whether to purge dead locations and enforce capacity
    pub should_housekeep: bool,
}

impl Stabilizer {
    pub fn new(interval: Duration, bits: usize, now: Instant) -> Self {
        Stabilizer {
            interval,
            last_round: now,
            next_finger: 0,
            bits,
            rounds: 0,
        }
    }

    pub fn rounds(&self) -> u64 {
        self.rounds
    }

    pub fn next_round_at(&self) -> Instant {
        self.last_round + self.interval
    }

    /// Determine what stabilization work is due at `now`.
    ///
    /// Starts a new round, and resets the timer, once the interval elapsed.
    pub fn periodic_decisions_at(&mut self, now: Instant) -> StabilizationDecisions {
        if now.saturating_duration_since(self.last_round) < self.interval {
            return StabilizationDecisions {
                should_stabilize: false,
                finger_to_fix: None,
                should_check_predecessor: false,
                should_housekeep: false,
            };
        }

        self.round_at(now)
    }

    /// Start a round right away.
    pub fn round_at(&mut self, now: Instant) -> StabilizationDecisions {
        self.last_round = now;
        self.rounds += 1;

        let finger = self.next_finger;
        self.next_finger = (self.next_finger + 1) % self.bits.max(1);

        StabilizationDecisions {
            should_stabilize: true,
            finger_to_fix: Some(finger),
            should_check_predecessor: true,
            should_housekeep: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn waits_for_the_interval() {
        let start = Instant::now();
        let interval = Duration::from_secs(30);
        let mut stabilizer = Stabilizer::new(interval, 8, start);

        assert!(!stabilizer.periodic_decisions_at(start).should_stabilize);
        assert!(
            !stabilizer
                .periodic_decisions_at(start + Duration::from_secs(29))
                .should_stabilize
        );

        let decisions = stabilizer.periodic_decisions_at(start + interval);
        assert!(decisions.should_stabilize);
        assert!(decisions.should_housekeep);
        assert_eq!(stabilizer.next_round_at(), start + interval * 2);
    }

    #[test]
    fn fingers_round_robin() {
        let start = Instant::now();
        let mut stabilizer = Stabilizer::new(Duration::from_secs(1), 3, start);

        let fixed = (0..7)
            .map(|_| stabilizer.round_at(start).finger_to_fix.unwrap())
            .collect::<Vec<_>>();

        assert_eq!(fixed, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(stabilizer.rounds(), 7);
    }
}
