//! # Crash-loop restart policy for keep-alive services.
//!
//! [`RestartPolicy`] decides what happens after a keep-alive service exits.
//! A *fast failure* is a non-zero exit (or a signal death) that happens before
//! [`RestartPolicy::fast_failure_window`] has elapsed since spawn.
//!
//! ```text
//! exit observed
//!   ├─ success, or ran >= window ──► Restart        (counter back to 0)
//!   └─ fast failure ──► counter += 1
//!                         ├─ counter <  give_up_after ──► Retry { attempt }
//!                         └─ counter >= give_up_after ──► GiveUp { attempts }
//! ```
//!
//! With the defaults (`give_up_after = 3`, window = 1s) the first and second
//! consecutive fast failures are retried and the third one is final.

use std::time::Duration;

use crate::exit::ExitStatus;

/// Policy constants for the fast-failure backoff.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Consecutive fast failures after which the service is given up.
    pub give_up_after: u32,
    /// Minimum run time for an exit not to count as a fast failure.
    pub fast_failure_window: Duration,
}

impl Default for RestartPolicy {
    /// Returns `give_up_after = 3`, `fast_failure_window = 1000ms`.
    fn default() -> Self {
        Self {
            give_up_after: 3,
            fast_failure_window: Duration::from_millis(1000),
        }
    }
}

/// Outcome of [`RestartPolicy::decide`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RestartDecision {
    /// Normal re-activation; the failure counter is reset.
    Restart,
    /// Fast failure still within budget; `attempt` is the new counter value.
    Retry {
        /// Consecutive fast failures so far (1-based).
        attempt: u32,
    },
    /// Budget exhausted; do not activate again.
    GiveUp {
        /// Consecutive fast failures observed.
        attempts: u32,
    },
}

impl RestartDecision {
    /// Failure counter value the service should hold after this decision.
    pub fn failures(&self) -> u32 {
        match self {
            RestartDecision::Restart => 0,
            RestartDecision::Retry { attempt } => *attempt,
            RestartDecision::GiveUp { attempts } => *attempts,
        }
    }

    /// Human-readable note for logs.
    pub fn message(&self) -> &'static str {
        match self {
            RestartDecision::Restart => "restarting",
            RestartDecision::Retry { attempt: 1 } => "trying again",
            RestartDecision::Retry { attempt: 2 } => "third time's a charm?",
            RestartDecision::Retry { .. } => "retrying",
            RestartDecision::GiveUp { .. } => "giving up",
        }
    }
}

impl RestartPolicy {
    /// True if this exit counts toward the crash-loop budget.
    pub fn is_fast_failure(&self, exit: ExitStatus, run_time: Duration) -> bool {
        !exit.success() && run_time < self.fast_failure_window
    }

    /// Decides how to proceed after an exit, given the current failure counter.
    pub fn decide(&self, exit: ExitStatus, run_time: Duration, failures: u32) -> RestartDecision {
        if !self.is_fast_failure(exit, run_time) {
            return RestartDecision::Restart;
        }
        let attempt = failures.saturating_add(1);
        if attempt >= self.give_up_after {
            RestartDecision::GiveUp { attempts: attempt }
        } else {
            RestartDecision::Retry { attempt }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FAST: Duration = Duration::from_millis(10);
    const SLOW: Duration = Duration::from_millis(1500);

    #[test]
    fn third_fast_failure_gives_up() {
        let policy = RestartPolicy::default();
        let failed = ExitStatus::Exited(1);

        let first = policy.decide(failed, FAST, 0);
        assert_eq!(first, RestartDecision::Retry { attempt: 1 });
        let second = policy.decide(failed, FAST, first.failures());
        assert_eq!(second, RestartDecision::Retry { attempt: 2 });
        let third = policy.decide(failed, FAST, second.failures());
        assert_eq!(third, RestartDecision::GiveUp { attempts: 3 });
    }

    #[test]
    fn slow_or_clean_exit_resets() {
        let policy = RestartPolicy::default();
        assert_eq!(
            policy.decide(ExitStatus::Exited(1), SLOW, 2),
            RestartDecision::Restart
        );
        assert_eq!(
            policy.decide(ExitStatus::Exited(0), FAST, 2),
            RestartDecision::Restart
        );
        assert_eq!(RestartDecision::Restart.failures(), 0);
    }

    #[test]
    fn window_boundary_is_not_fast() {
        let policy = RestartPolicy::default();
        assert!(!policy.is_fast_failure(ExitStatus::Exited(1), Duration::from_millis(1000)));
        assert!(policy.is_fast_failure(ExitStatus::Exited(1), Duration::from_millis(999)));
    }

    #[test]
    fn custom_budget() {
        let policy = RestartPolicy {
            give_up_after: 1,
            fast_failure_window: Duration::from_secs(5),
        };
        assert_eq!(
            policy.decide(ExitStatus::Exited(2), Duration::from_secs(4), 0),
            RestartDecision::GiveUp { attempts: 1 }
        );
    }

    #[test]
    fn escalating_messages() {
        assert_eq!(RestartDecision::Retry { attempt: 1 }.message(), "trying again");
        assert_eq!(
            RestartDecision::Retry { attempt: 2 }.message(),
            "third time's a charm?"
        );
        assert_eq!(RestartDecision::GiveUp { attempts: 3 }.message(), "giving up");
    }
}
