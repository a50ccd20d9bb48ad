//! # Service: the per-service lifecycle state machine.
//!
//! A [`Service`] composes its [`ServiceDescriptor`], its activation socket,
//! the process launcher and the restart policy. The supervisor drives it
//! through three entry points, one event at a time:
//!
//! ```text
//!                 activate()                   socket ready (takeover)
//!   Inactive ──────────────────► Listening ─────────────────────────► Running
//!      │  (not lazy: spawn)         │  ▲                                 │
//!      └────────────────────────────┼──┼──────────────► Running         │ exit
//!                                   │  │                                 ▼
//!             socket ready (accept) │  └──────── activate() ◄── keep-alive? ──► Inactive
//!                                   ▼                  │
//!                               Accepting              └── third fast failure ──► GivenUp
//!                      (accept + spawn per connection,
//!                       listener stays watched)
//! ```
//!
//! ## Rules
//! - A disabled service (boot mode not listed) ignores every entry point.
//! - The listening socket is opened once and kept across restarts.
//! - Only non-multi-instance processes are recorded (pid + registry entry).
//! - Exit handling is idempotent: an exit for a pid the service no longer
//!   tracks changes nothing.

use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::time::Instant;

use nix::unistd::Pid;
use serde::Serialize;

use crate::activation;
use crate::core::{Reactor, Registry, ServiceId};
use crate::error::{ConfigError, SetupError};
use crate::events::{Bus, Event, EventKind};
use crate::exit::ExitStatus;
use crate::launch::{Launch, LaunchPlan};
use crate::policies::{RestartDecision, RestartPolicy};

use super::descriptor::ServiceDescriptor;
use super::snapshot::ServiceSnapshot;

/// Lifecycle state of a [`Service`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    /// No watched socket and no tracked process.
    Inactive,
    /// Socket open and watched, nothing running.
    Listening,
    /// A tracked process is alive.
    Running,
    /// Listening and spawning one untracked process per accepted connection.
    Accepting,
    /// Fast-failure budget exhausted; never activated again.
    GivenUp,
}

/// Everything a transition needs besides the service itself.
pub(crate) struct Context<'a> {
    pub registry: &'a mut Registry,
    pub reactor: &'a mut dyn Reactor,
    pub launcher: &'a mut dyn Launch,
    pub bus: &'a Bus,
    pub policy: &'a RestartPolicy,
    pub backlog: i32,
}

/// Runtime state of one configured service.
#[derive(Debug)]
pub struct Service {
    id: ServiceId,
    descriptor: ServiceDescriptor,
    plan: LaunchPlan,
    listener: Option<OwnedFd>,
    watching: bool,
    pid: Option<Pid>,
    started_at: Option<Instant>,
    failures: u32,
    enabled: bool,
    state: ServiceState,
}

impl Service {
    pub(crate) fn new(
        id: ServiceId,
        descriptor: ServiceDescriptor,
        enabled: bool,
    ) -> Result<Self, ConfigError> {
        let plan = LaunchPlan::new(&descriptor)?;
        Ok(Self {
            id,
            descriptor,
            plan,
            listener: None,
            watching: false,
            pid: None,
            started_at: None,
            failures: 0,
            enabled,
            state: ServiceState::Inactive,
        })
    }

    pub fn id(&self) -> ServiceId {
        self.id
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &ServiceDescriptor {
        &self.descriptor
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Pid of the tracked process, if running.
    pub fn pid(&self) -> Option<Pid> {
        self.pid
    }

    /// Consecutive fast failures.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether the service is enabled for the current boot mode.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Activation socket descriptor, once opened.
    pub fn listener_fd(&self) -> Option<RawFd> {
        self.listener.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// True while the activation socket is registered for readiness.
    pub fn is_watching(&self) -> bool {
        self.watching
    }

    /// Read-only diagnostic projection.
    pub fn snapshot(&self) -> ServiceSnapshot {
        ServiceSnapshot::new(&self.descriptor, self.pid, self.failures, self.state)
    }

    /// Brings an inactive service to life: starts listening (lazy) or spawns right away.
    pub(crate) fn activate(&mut self, cx: &mut Context<'_>) {
        if !self.enabled || self.state != ServiceState::Inactive {
            return;
        }

        if self.descriptor.lazy {
            match self.listen(cx) {
                Ok(()) => self.state = ServiceState::Listening,
                Err(err) => self.activation_failed(cx, &err),
            }
            return;
        }

        let socket = match self.ensure_listener(cx.backlog) {
            Ok(fd) => fd,
            Err(err) => return self.activation_failed(cx, &err),
        };
        self.spawn(cx, socket);
    }

    /// Handles one readiness event on the activation socket.
    pub(crate) fn handle_socket_ready(&mut self, cx: &mut Context<'_>) {
        if !self.enabled {
            return;
        }
        if !matches!(self.state, ServiceState::Listening | ServiceState::Accepting) {
            return;
        }
        let Some(listener) = self.listener_fd() else {
            return;
        };

        if self.descriptor.accept_socket_connections {
            self.accept_and_spawn(cx, listener);
            return;
        }

        // Single-shot takeover: the process owns the socket from now on.
        self.unwatch(cx);
        self.state = ServiceState::Inactive;
        self.spawn(cx, Some(listener));
    }

    /// Handles the exit of `pid`. No-op unless `pid` is this service's tracked process.
    pub(crate) fn did_exit(&mut self, cx: &mut Context<'_>, pid: Pid, exit: ExitStatus) {
        if self.pid != Some(pid) {
            return;
        }

        cx.registry.remove(pid);
        let run_time = self
            .started_at
            .take()
            .map(|at| at.elapsed())
            .unwrap_or_default();
        self.pid = None;
        self.state = ServiceState::Inactive;

        cx.bus.publish(
            Event::new(EventKind::ServiceExited)
                .with_service(self.name())
                .with_pid(pid)
                .with_exit(exit)
                .with_run_time(run_time),
        );

        if !self.descriptor.keep_alive {
            cx.bus
                .publish(Event::new(EventKind::ServiceStopped).with_service(self.name()));
            return;
        }

        let decision = cx.policy.decide(exit, run_time, self.failures);
        self.failures = decision.failures();
        match decision {
            RestartDecision::Restart => {}
            RestartDecision::Retry { attempt } => {
                cx.bus.publish(
                    Event::new(EventKind::RestartScheduled)
                        .with_service(self.name())
                        .with_attempt(attempt)
                        .with_reason(decision.message()),
                );
            }
            RestartDecision::GiveUp { attempts } => {
                self.state = ServiceState::GivenUp;
                cx.bus.publish(
                    Event::new(EventKind::ServiceGivenUp)
                        .with_service(self.name())
                        .with_attempt(attempts)
                        .with_reason(decision.message()),
                );
                return;
            }
        }
        self.activate(cx);
    }

    fn accept_and_spawn(&mut self, cx: &mut Context<'_>, listener: RawFd) {
        let path = self.descriptor.socket_path().unwrap_or(std::path::Path::new(""));
        match activation::accept_connection(listener, path) {
            Ok(conn) => {
                cx.bus
                    .publish(Event::new(EventKind::ConnectionAccepted).with_service(self.name()));
                self.state = ServiceState::Accepting;
                self.spawn(cx, Some(conn.as_raw_fd()));
                // `conn` drops here: the child holds its own copy on fd 3.
            }
            Err(err) if err.is_would_block() => {}
            Err(err) => {
                tracing::warn!(service = self.name(), error = %err, "accept failed");
            }
        }
    }

    /// Opens (if needed) and watches the activation socket.
    fn listen(&mut self, cx: &mut Context<'_>) -> Result<(), SetupError> {
        let Some(fd) = self.ensure_listener(cx.backlog)? else {
            return Ok(());
        };
        if !self.watching {
            cx.reactor.watch(self.id, fd)?;
            self.watching = true;
        }
        let socket = self
            .descriptor
            .socket_path()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        cx.bus.publish(
            Event::new(EventKind::SocketListening)
                .with_service(self.name())
                .with_reason(socket),
        );
        Ok(())
    }

    fn unwatch(&mut self, cx: &mut Context<'_>) {
        if self.watching {
            cx.reactor.unwatch(self.id);
            self.watching = false;
        }
    }

    /// Returns the activation socket, opening it on first use. `None` if no socket is configured.
    fn ensure_listener(&mut self, backlog: i32) -> Result<Option<RawFd>, SetupError> {
        if let Some(fd) = self.listener_fd() {
            return Ok(Some(fd));
        }
        let Some(path) = self.descriptor.socket_path() else {
            return Ok(None);
        };
        let fd = activation::open_listener(
            path,
            self.descriptor.socket_permissions(),
            self.descriptor.account(),
            backlog,
        )?;
        let raw = fd.as_raw_fd();
        self.listener = Some(fd);
        Ok(Some(raw))
    }

    /// Launches one process. Returns false if `fork` failed.
    fn spawn(&mut self, cx: &mut Context<'_>, socket: Option<RawFd>) -> bool {
        let started = Instant::now();
        let pid = match cx.launcher.launch(&self.plan, socket) {
            Ok(pid) => pid,
            Err(err) => {
                tracing::error!(service = self.name(), error = %err, "spawn failed");
                cx.bus.publish(
                    Event::new(EventKind::SpawnFailed)
                        .with_service(self.name())
                        .with_reason(err.to_string()),
                );
                return false;
            }
        };

        let tracking = if self.descriptor.multi_instance {
            "untracked"
        } else {
            self.pid = Some(pid);
            self.started_at = Some(started);
            self.state = ServiceState::Running;
            if let Some(previous) = cx.registry.insert(pid, self.id) {
                tracing::warn!(service = self.name(), %pid, %previous, "pid already registered");
            }
            "tracked"
        };
        cx.bus.publish(
            Event::new(EventKind::ServiceSpawned)
                .with_service(self.name())
                .with_pid(pid)
                .with_reason(tracking),
        );
        true
    }

    fn activation_failed(&mut self, cx: &mut Context<'_>, err: &SetupError) {
        tracing::error!(service = self.name(), error = %err, label = err.as_label(), "activation failed");
        cx.bus.publish(
            Event::new(EventKind::ActivationFailed)
                .with_service(self.name())
                .with_reason(err.to_string()),
        );
    }

    /// Pretends the tracked process started `by` earlier.
    #[cfg(test)]
    pub(crate) fn backdate(&mut self, by: std::time::Duration) {
        if let Some(at) = self.started_at {
            self.started_at = Some(at.checked_sub(by).unwrap_or(at));
        }
    }
}
