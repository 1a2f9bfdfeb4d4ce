//! Reconnection policy: whether and when to reopen a closed connection.
//!
//! Backoff is linear and capped: attempt `n` waits `min(base * n, ceiling)`.

use crate::config::SessionConfig;
use crate::error::ConnectionFailure;
use std::collections::BTreeSet;
use std::time::Duration;

/// Schedules the single pending reconnect callback of a session.
///
/// Implementations must drop any previously scheduled callback when
/// `schedule` is called again, and `cancel` must be idempotent.
#[cfg_attr(test, mockall::automock)]
pub trait ReconnectTimer {
    fn schedule(&mut self, delay: Duration);
    fn cancel(&mut self);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Reopen after `delay`; `attempt` is the new attempt count (1-based).
    Retry { delay: Duration, attempt: u32 },
    GiveUp(ConnectionFailure),
    /// The conversation already ended, a closed socket is expected.
    NoAction,
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    max_attempts: u32,
    base: Duration,
    ceiling: Duration,
    permanent_codes: BTreeSet<u16>,
}

impl ReconnectPolicy {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            max_attempts: config.max_reconnect_attempts,
            base: config.backoff_base,
            ceiling: config.backoff_ceiling,
            permanent_codes: config.permanent_close_codes.clone(),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_permanent(&self, code: u16) -> bool {
        self.permanent_codes.contains(&code)
    }

    /// Delay before the `attempt`-th reconnect (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base.saturating_mul(attempt).min(self.ceiling)
    }

    /// Decides what to do after a closure.
    ///
    /// `code` is `None` when the retry path is entered without a close event,
    /// e.g. after a failed send.
    pub fn decide(&self, code: Option<u16>, completed: bool, attempts: u32) -> ReconnectDecision {
        if let Some(code) = code.filter(|c| self.is_permanent(*c)) {
            return ReconnectDecision::GiveUp(ConnectionFailure::PermanentClosure(code));
        }
        if completed {
            return ReconnectDecision::NoAction;
        }
        if attempts < self.max_attempts {
            let attempt = attempts + 1;
            return ReconnectDecision::Retry {
                delay: self.delay_for(attempt),
                attempt,
            };
        }
        ReconnectDecision::GiveUp(ConnectionFailure::ReconnectExhausted(attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> ReconnectPolicy {
        ReconnectPolicy::new(&SessionConfig::default())
    }

    #[test]
    fn test_backoff_is_linear_and_capped() {
        let policy = ReconnectPolicy::new(&SessionConfig::default().with_max_reconnect_attempts(6));
        let delays: Vec<u64> = (1..=6).map(|n| policy.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![2000, 4000, 6000, 8000, 8000, 8000]);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_permanent_codes_never_retry() {
        let policy = policy();
        for code in [401, 403, 4001, 4003, 4004] {
            for attempts in 0..=policy.max_attempts() {
                assert_eq!(
                    policy.decide(Some(code), false, attempts),
                    ReconnectDecision::GiveUp(ConnectionFailure::PermanentClosure(code))
                );
                assert_eq!(
                    policy.decide(Some(code), true, attempts),
                    ReconnectDecision::GiveUp(ConnectionFailure::PermanentClosure(code))
                );
            }
        }
    }

    #[test]
    fn test_completed_conversation_needs_no_action() {
        assert_eq!(policy().decide(Some(1000), true, 0), ReconnectDecision::NoAction);
        assert_eq!(policy().decide(None, true, 0), ReconnectDecision::NoAction);
    }

    #[test]
    fn test_abnormal_closure_retries_until_exhausted() {
        let policy = policy();
        assert_eq!(
            policy.decide(Some(1006), false, 0),
            ReconnectDecision::Retry {
                delay: Duration::from_millis(2000),
                attempt: 1
            }
        );
        assert_eq!(
            policy.decide(None, false, 2),
            ReconnectDecision::Retry {
                delay: Duration::from_millis(6000),
                attempt: 3
            }
        );
        assert_eq!(
            policy.decide(Some(1006), false, 3),
            ReconnectDecision::GiveUp(ConnectionFailure::ReconnectExhausted(3))
        );
    }
}
