//! # LogWriter: events rendered through `tracing`
//!
//! Maps every [`Event`] onto a `tracing` record under the `servisor` target.
//! Install any `tracing` subscriber (e.g. `tracing_subscriber::fmt`) to see them.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO servisor: listening service="clock" socket="/tmp/portal/clock"
//! INFO servisor: spawned service="clock" pid=4242 tracking="tracked"
//! WARN servisor: exited service="clock" pid=4242 code=Some(1) signal=None run_ms=Some(3)
//! WARN servisor: trying again service="clock" attempt=1
//! ERROR servisor: giving up service="clock" attempts=3
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let service = e.service.as_deref().unwrap_or("");
        let reason = e.reason.as_deref().unwrap_or("");
        match e.kind {
            EventKind::SocketListening => {
                tracing::info!(target: "servisor", service, socket = reason, "listening");
            }
            EventKind::ConnectionAccepted => {
                tracing::debug!(target: "servisor", service, "connection accepted");
            }
            EventKind::ServiceSpawned => {
                tracing::info!(target: "servisor", service, pid = ?e.pid, tracking = reason, "spawned");
            }
            EventKind::SpawnFailed => {
                tracing::error!(target: "servisor", service, error = reason, "spawn failed");
            }
            EventKind::ActivationFailed => {
                tracing::error!(target: "servisor", service, error = reason, "activation failed");
            }
            EventKind::ServiceExited => {
                if e.exit_code == Some(0) {
                    tracing::info!(target: "servisor", service, pid = ?e.pid, run_ms = ?e.run_ms, "exited");
                } else {
                    tracing::warn!(
                        target: "servisor",
                        service,
                        pid = ?e.pid,
                        code = ?e.exit_code,
                        signal = ?e.signal,
                        run_ms = ?e.run_ms,
                        "exited"
                    );
                }
            }
            EventKind::ServiceStopped => {
                tracing::info!(target: "servisor", service, "stopped");
            }
            EventKind::RestartScheduled => {
                tracing::warn!(target: "servisor", service, attempt = ?e.attempt, "{reason}");
            }
            EventKind::ServiceGivenUp => {
                tracing::error!(target: "servisor", service, attempts = ?e.attempt, "{reason}");
            }
            EventKind::UnknownChildReaped => {
                tracing::debug!(
                    target: "servisor",
                    pid = ?e.pid,
                    code = ?e.exit_code,
                    signal = ?e.signal,
                    "reaped untracked child"
                );
            }
            EventKind::ShutdownRequested => {
                tracing::info!(target: "servisor", "shutdown requested");
            }
            EventKind::SubscriberOverflow => {
                tracing::warn!(target: "servisor", subscriber = service, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                tracing::warn!(target: "servisor", subscriber = service, info = reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
