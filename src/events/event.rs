//! # Runtime events emitted by the supervisor and its services.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Activation events**: socket setup, accepted connections, spawns
//! - **Exit events**: observed exits and the restart decision taken for them
//! - **Runtime events**: shutdown and subscriber health
//!
//! The [`Event`] struct carries additional metadata such as timestamps, service
//! name, pid, exit status and restart attempt.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use servisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RestartScheduled)
//!     .with_service("clock")
//!     .with_attempt(2)
//!     .with_reason("third time's a charm?");
//!
//! assert_eq!(ev.kind, EventKind::RestartScheduled);
//! assert_eq!(ev.service.as_deref(), Some("clock"));
//! assert_eq!(ev.attempt, Some(2));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use nix::unistd::Pid;

use crate::exit::ExitStatus;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Activation ===
    /// Activation socket bound and watched for connections.
    ///
    /// Sets: `service`, `reason` (socket path)
    SocketListening,

    /// A connection was accepted on behalf of an accepting service.
    ///
    /// Sets: `service`
    ConnectionAccepted,

    /// A process was created.
    ///
    /// Sets: `service`, `pid`, `reason` (`"tracked"` or `"untracked"`)
    ServiceSpawned,

    /// `fork` failed; the service stays inactive.
    ///
    /// Sets: `service`, `reason`
    SpawnFailed,

    /// The activation socket or its readiness watch could not be set up.
    ///
    /// Sets: `service`, `reason`
    ActivationFailed,

    // === Exits ===
    /// A tracked process exited.
    ///
    /// Sets: `service`, `pid`, `exit_code` or `signal`, `run_ms`
    ServiceExited,

    /// Service is not kept alive and went back to inactive.
    ///
    /// Sets: `service`
    ServiceStopped,

    /// A fast failure is being retried.
    ///
    /// Sets: `service`, `attempt`, `reason`
    RestartScheduled,

    /// Fast-failure budget exhausted; the service will not be activated again.
    ///
    /// Sets: `service`, `attempt`, `reason`
    ServiceGivenUp,

    /// An exited child had no registry entry (multi-instance or already handled).
    ///
    /// Sets: `pid`, `exit_code` or `signal`
    UnknownChildReaped,

    // === Runtime ===
    /// Shutdown requested (OS signal or cancellation).
    ShutdownRequested,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `service` (subscriber name), `reason`
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets: `service` (subscriber name), `reason`
    SubscriberPanicked,
}

/// Runtime event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the service, if applicable.
    pub service: Option<Arc<str>>,
    /// Process id involved.
    pub pid: Option<i32>,
    /// Exit code of a normally exited process.
    pub exit_code: Option<i32>,
    /// Signal that killed the process.
    pub signal: Option<i32>,
    /// Run time of the exited process in milliseconds (compact).
    pub run_ms: Option<u32>,
    /// Consecutive fast failures.
    pub attempt: Option<u32>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            service: None,
            pid: None,
            exit_code: None,
            signal: None,
            run_ms: None,
            attempt: None,
            reason: None,
        }
    }

    /// Attaches a service name.
    #[inline]
    pub fn with_service(mut self, service: impl Into<Arc<str>>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Attaches a process id.
    #[inline]
    pub fn with_pid(mut self, pid: Pid) -> Self {
        self.pid = Some(pid.as_raw());
        self
    }

    /// Attaches an exit status.
    #[inline]
    pub fn with_exit(mut self, exit: ExitStatus) -> Self {
        self.exit_code = exit.code();
        self.signal = exit.signal();
        self
    }

    /// Attaches a run time (stored as milliseconds).
    #[inline]
    pub fn with_run_time(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.run_ms = Some(ms);
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_service(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_service(subscriber)
            .with_reason(info)
    }

    /// True for events the subscriber machinery reports about itself.
    #[inline]
    pub fn is_subscriber_event(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::Signal;

    #[test]
    fn sequence_is_monotonic() {
        let a = Event::new(EventKind::ShutdownRequested);
        let b = Event::new(EventKind::ShutdownRequested);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn exit_metadata() {
        let ev = Event::new(EventKind::ServiceExited)
            .with_pid(Pid::from_raw(7))
            .with_exit(ExitStatus::Signaled(Signal::SIGTERM))
            .with_run_time(Duration::from_millis(1500));
        assert_eq!(ev.pid, Some(7));
        assert_eq!(ev.exit_code, None);
        assert_eq!(ev.signal, Some(libc::SIGTERM));
        assert_eq!(ev.run_ms, Some(1500));
    }
}
