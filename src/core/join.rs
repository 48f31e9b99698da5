//! Joining an existing ring through a bootstrap node.

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use flume::Sender;

use crate::common::Node;
use crate::core::lookup::LookupId;
use crate::error::JoinError;

/// Default number of attempts after the first one fails.
pub const DEFAULT_BOOTSTRAP_RETRIES: usize = 3;
/// Default delay between two join attempts.
pub const DEFAULT_BOOTSTRAP_RETRY_DELAY: Duration = Duration::from_secs(5);

pub type JoinResponse = Result<Node, JoinError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinPhase {
    /// Waiting for the bootstrap node to tell us its id.
    Pinging { address: SocketAddr },
    /// Looking for our own predecessor, starting at the bootstrap node.
    Locating { lookup: LookupId },
    /// Attempt failed, the next one starts at `retry_at`.
    Waiting { retry_at: Instant },
}

#[derive(Debug)]
pub enum JoinStep {
    Retry { at: Instant },
    GiveUp(JoinError),
}

#[derive(Debug)]
/// State of a join across attempts.
pub struct Join {
    bootstrap: Box<[SocketAddr]>,
    attempt: usize,
    retries: usize,
    retry_delay: Duration,
    phase: JoinPhase,
    sender: Option<Sender<JoinResponse>>,
}

impl Join {
    /// Returns None if `bootstrap` is empty.
    pub fn new(
        bootstrap: Box<[SocketAddr]>,
        retries: usize,
        retry_delay: Duration,
        sender: Option<Sender<JoinResponse>>,
    ) -> Option<Self> {
        let address = *bootstrap.first()?;

        Some(Join {
            bootstrap,
            attempt: 0,
            retries,
            retry_delay,
            phase: JoinPhase::Pinging { address },
            sender,
        })
    }

    // === Getters ===

    pub fn phase(&self) -> JoinPhase {
        self.phase
    }

    pub fn attempt(&self) -> usize {
        self.attempt
    }

    /// Bootstrap address of the current attempt, rotating through the list.
    pub fn bootstrap_address(&self) -> SocketAddr {
        self.bootstrap[self.attempt % self.bootstrap.len()]
    }

    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.phase, JoinPhase::Waiting { retry_at } if retry_at <= now)
    }

    // === Public Methods ===

    /// Start the next attempt, returning the address to ping.
    pub fn begin_attempt(&mut self) -> SocketAddr {
        let address = self.bootstrap_address();
        self.phase = JoinPhase::Pinging { address };

        address
    }

    pub fn locating(&mut self, lookup: LookupId) {
        self.phase = JoinPhase::Locating { lookup };
    }

    /// Record a failed attempt.
    pub fn fail(&mut self, now: Instant, error: JoinError) -> JoinStep {
        if self.attempt >= self.retries {
            return JoinStep::GiveUp(error);
        }

        self.attempt += 1;
        let retry_at = now + self.retry_delay;
        self.phase = JoinPhase::Waiting { retry_at };

        JoinStep::Retry { at: retry_at }
    }

    /// Consume the join and deliver its outcome to whoever asked for it.
    pub fn respond(self, response: JoinResponse) {
        if let Some(sender) = self.sender {
            let _ = sender.send(response);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_bootstrap() {
        assert!(Join::new(Box::new([]), 3, Duration::ZERO, None).is_none());
    }

    #[test]
    fn retries_rotate_bootstrap_nodes() {
        let a: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let b: SocketAddr = "127.0.0.1:2".parse().unwrap();
        let now = Instant::now();
        let delay = Duration::from_secs(1);

        let mut join = Join::new(Box::new([a, b]), 2, delay, None).unwrap();
        assert_eq!(join.begin_attempt(), a);

        let JoinStep::Retry { at } = join.fail(now, JoinError::BootstrapUnreachable(a)) else {
            panic!("should retry")
        };
        assert_eq!(at, now + delay);
        assert!(!join.is_due(now));
        assert!(join.is_due(now + delay));
        assert_eq!(join.begin_attempt(), b);

        assert!(matches!(
            join.fail(now, JoinError::BootstrapUnreachable(b)),
            JoinStep::Retry { .. }
        ));
        assert_eq!(join.begin_attempt(), a);

        assert!(matches!(
            join.fail(now, JoinError::BootstrapUnreachable(a)),
            JoinStep::GiveUp(JoinError::BootstrapUnreachable(_))
        ));
    }

    #[test]
    fn respond_reaches_the_caller() {
        let (tx, rx) = flume::bounded(1);
        let address: SocketAddr = "127.0.0.1:1".parse().unwrap();

        let join = Join::new(Box::new([address]), 0, Duration::ZERO, Some(tx)).unwrap();
        join.respond(Err(JoinError::SelfBootstrap));

        assert_eq!(rx.recv().unwrap(), Err(JoinError::SelfBootstrap));
    }
}
