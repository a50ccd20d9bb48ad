//! # Supervisor: owns the services and dispatches OS events to them.
//!
//! The [`Supervisor`] owns every [`Service`], the pid [`Registry`], the
//! readiness [`TokioReactor`], the launcher and the event [`Bus`]. It is the
//! only place where events enter the service state machines.
//!
//! ## High-level architecture
//! ```text
//! SupervisorBuilder::load(source, accounts) ──► build() ──► Supervisor
//!
//! Supervisor::run():
//!   activate_all()                         (enabled services only, once per supervisor)
//!   loop (one event at a time, current-thread runtime):
//!     ├─ CancellationToken / SIGINT / SIGTERM / SIGQUIT ─► ShutdownRequested, break
//!     ├─ SIGCHLD ─► waitpid(-1, WNOHANG) until empty
//!     │               └─► handle_exit(pid, status)
//!     │                     ├─ registry hit  ─► Service::did_exit
//!     │                     └─ registry miss ─► UnknownChildReaped
//!     ├─ reactor.ready() ─► handle_socket_ready(id) ─► Service::handle_socket_ready
//!     └─ Bus event ─► SubscriberSet::emit (fire-and-forget)
//!   drain pending events, shut the subscriber set down
//! ```
//!
//! ## Rules
//! - Transitions never yield, so they are atomic with respect to each other.
//! - Children are never killed; shutdown only stops supervising.
//! - A failure in one service never touches another service's state or registry entries.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use servisor::{MemorySource, Supervisor, SupervisorConfig, SystemAccounts};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = MemorySource::new().with_group(
//!         "clock",
//!         [("Socket", "/tmp/portal/clock"), ("Lazy", "true"), ("KeepAlive", "true")],
//!     );
//!
//!     let mut sup = Supervisor::builder(SupervisorConfig::default())
//!         .load(&source, &SystemAccounts)?
//!         .build()?;
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio_util::sync::CancellationToken;

use crate::config::SupervisorConfig;
use crate::core::{
    builder::SupervisorBuilder,
    reactor::TokioReactor,
    registry::{Registry, ServiceId},
    shutdown,
};
use crate::error::RuntimeError;
use crate::events::{Bus, Event, EventKind};
use crate::exit::ExitStatus;
use crate::launch::{ForkExec, Launch};
use crate::services::{Context, Service, ServiceSnapshot};
use crate::subscribers::{Subscribe, SubscriberSet};

/// Owns the services and routes readiness and exit events to them.
///
/// Socket-touching entry points (`activate_all`, `handle_socket_ready`,
/// `run`) must be called inside a tokio runtime.
pub struct Supervisor<L = ForkExec> {
    cfg: SupervisorConfig,
    bus: Bus,
    events: broadcast::Receiver<Event>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    services: Vec<Service>,
    registry: Registry,
    reactor: TokioReactor,
    launcher: L,
    token: CancellationToken,
    activated: bool,
}

impl Supervisor {
    /// Starts building a supervisor with the real `fork`/`exec` launcher.
    pub fn builder(cfg: SupervisorConfig) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg)
    }
}

impl<L: Launch> Supervisor<L> {
    pub(crate) fn new_internal(
        cfg: SupervisorConfig,
        bus: Bus,
        subscribers: Vec<Arc<dyn Subscribe>>,
        services: Vec<Service>,
        launcher: L,
    ) -> Self {
        let events = bus.subscribe();
        Self {
            cfg,
            bus,
            events,
            subscribers,
            services,
            registry: Registry::new(),
            reactor: TokioReactor::new(),
            launcher,
            token: CancellationToken::new(),
            activated: false,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.cfg
    }

    /// Event bus shared with all services.
    pub fn bus(&self) -> &Bus {
        &self.bus
    }

    pub fn services(&self) -> &[Service] {
        &self.services
    }

    /// Looks a service up by name.
    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name() == name)
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Token that stops [`run`](Self::run) when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Activates every service enabled for the current boot mode.
    ///
    /// Only the first call (explicit, or the one [`run`](Self::run) makes) does
    /// anything. A service whose socket setup or spawn failed is not retried.
    pub fn activate_all(&mut self) {
        if std::mem::replace(&mut self.activated, true) {
            return;
        }
        for index in 0..self.services.len() {
            self.dispatch(ServiceId::new(index), |service, cx| service.activate(cx));
        }
    }

    /// Delivers a readiness event for the activation socket of `id`.
    pub fn handle_socket_ready(&mut self, id: ServiceId) {
        self.dispatch(id, |service, cx| service.handle_socket_ready(cx));
    }

    /// Delivers an observed process exit. Pids without a registry entry change nothing.
    pub fn handle_exit(&mut self, pid: Pid, exit: ExitStatus) {
        match self.registry.get(pid) {
            Some(id) => self.dispatch(id, |service, cx| service.did_exit(cx, pid, exit)),
            None => self.bus.publish(
                Event::new(EventKind::UnknownChildReaped)
                    .with_pid(pid)
                    .with_exit(exit),
            ),
        }
    }

    /// Diagnostic view of every service.
    pub fn snapshot(&self) -> Vec<ServiceSnapshot> {
        self.services.iter().map(Service::snapshot).collect()
    }

    /// [`snapshot`](Self::snapshot) as pretty-printed JSON.
    pub fn snapshot_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.snapshot())
    }

    /// Runs the dispatch loop until a termination signal or [`shutdown_token`](Self::shutdown_token)
    /// cancellation.
    pub async fn run(&mut self) -> Result<(), RuntimeError> {
        let mut sigchld = signal(SignalKind::child()).map_err(RuntimeError::Signal)?;
        let shutdown = shutdown::wait_for_shutdown_signal();
        tokio::pin!(shutdown);

        let set = SubscriberSet::new(std::mem::take(&mut self.subscribers), self.bus.clone());
        let token = self.token.clone();

        self.activate_all();
        // Children that exited before SIGCHLD was hooked.
        self.reap();

        let result = loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break Ok(()),
                res = &mut shutdown => break res.map_err(RuntimeError::Signal),
                _ = sigchld.recv() => self.reap(),
                id = self.reactor.ready() => self.handle_socket_ready(id),
                ev = self.events.recv() => forward(&set, ev),
            }
        };

        self.bus.publish(Event::new(EventKind::ShutdownRequested));
        loop {
            match self.events.try_recv() {
                Ok(ev) => set.emit(&ev),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event listener lagged");
                }
                Err(_) => break,
            }
        }
        set.shutdown().await;

        if let Err(err) = &result {
            tracing::error!(error = %err, label = err.as_label(), "supervisor stopped");
        }
        result
    }

    /// Collects every exited child without blocking.
    fn reap(&mut self) {
        loop {
            match waitpid(None, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => break,
                Ok(status) => {
                    if let Some((pid, exit)) = ExitStatus::from_wait(status) {
                        self.handle_exit(pid, exit);
                    }
                }
                Err(Errno::EINTR) => continue,
                Err(Errno::ECHILD) => break,
                Err(errno) => {
                    tracing::warn!(%errno, "waitpid failed");
                    break;
                }
            }
        }
    }

    fn dispatch<F>(&mut self, id: ServiceId, f: F)
    where
        F: FnOnce(&mut Service, &mut Context<'_>),
    {
        let Some(service) = self.services.get_mut(id.index()) else {
            return;
        };
        let mut cx = Context {
            registry: &mut self.registry,
            reactor: &mut self.reactor,
            launcher: &mut self.launcher,
            bus: &self.bus,
            policy: &self.cfg.restart,
            backlog: self.cfg.listen_backlog,
        };
        f(service, &mut cx);
    }
}

fn forward(set: &SubscriberSet, ev: Result<Event, RecvError>) {
    match ev {
        Ok(ev) => set.emit(&ev),
        Err(RecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "event listener lagged");
        }
        Err(RecvError::Closed) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use crate::services::{Recorder, ServiceDescriptor, ServiceState};
    use crate::sources::{MemorySource, StaticAccounts};
    use std::os::unix::net::UnixStream;

    fn supervisor(source: &MemorySource) -> Supervisor<Recorder> {
        Supervisor::builder(SupervisorConfig::default())
            .with_launcher(Recorder::default())
            .load(source, &StaticAccounts::new())
            .unwrap()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn boot_mode_selects_services() {
        let source = MemorySource::new()
            .with_group("desktop", [("Executable", "/bin/true")])
            .with_group("console", [("BootModes", "text, self-test")]);
        let mut sup = supervisor(&source);

        sup.activate_all();
        assert_eq!(sup.service("desktop").unwrap().state(), ServiceState::Running);
        let console = sup.service("console").unwrap();
        assert!(!console.is_enabled());
        assert_eq!(console.state(), ServiceState::Inactive);
        assert_eq!(sup.registry().len(), 1);
    }

    #[tokio::test]
    async fn activation_happens_once() {
        let source = MemorySource::new().with_group("flaky", [("Executable", "/bin/true")]);
        let mut sup = Supervisor::builder(SupervisorConfig::default())
            .with_launcher(Recorder {
                fail: true,
                ..Recorder::default()
            })
            .load(&source, &StaticAccounts::new())
            .unwrap()
            .build()
            .unwrap();
        let mut rx = sup.bus().subscribe();

        sup.activate_all();
        sup.activate_all();
        assert_eq!(sup.service("flaky").unwrap().state(), ServiceState::Inactive);

        let failures = std::iter::from_fn(|| rx.try_recv().ok())
            .filter(|e| e.kind == EventKind::SpawnFailed)
            .count();
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn exits_are_routed_through_the_registry() {
        let source = MemorySource::new().with_group("echo", [("Executable", "/bin/echo")]);
        let mut sup = supervisor(&source);
        let mut rx = sup.bus().subscribe();

        sup.activate_all();
        let pid = sup.service("echo").unwrap().pid().unwrap();
        assert_eq!(sup.registry().get(pid), Some(ServiceId::new(0)));

        sup.handle_exit(pid, ExitStatus::Exited(0));
        assert!(sup.registry().is_empty());
        assert_eq!(sup.service("echo").unwrap().state(), ServiceState::Inactive);

        // Second delivery: nothing left to route.
        sup.handle_exit(pid, ExitStatus::Exited(0));
        assert_eq!(sup.service("echo").unwrap().state(), ServiceState::Inactive);

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::ServiceSpawned,
                EventKind::ServiceExited,
                EventKind::ServiceStopped,
                EventKind::UnknownChildReaped,
            ]
        );
    }

    #[tokio::test]
    async fn readiness_hands_the_socket_over() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clock");
        let source = MemorySource::new().with_group(
            "clock",
            [
                ("Socket", path.to_str().unwrap()),
                ("Lazy", "true"),
                ("KeepAlive", "true"),
            ],
        );
        let mut sup = supervisor(&source);

        sup.activate_all();
        let id = sup.service("clock").unwrap().id();
        assert!(sup.reactor.is_watching(id));
        assert!(sup.registry().is_empty());

        let _client = UnixStream::connect(&path).unwrap();
        sup.handle_socket_ready(id);
        assert_eq!(sup.service("clock").unwrap().state(), ServiceState::Running);
        assert!(!sup.reactor.is_watching(id));
        assert_eq!(sup.launcher.launches, vec![("clock".to_string(), true)]);
    }

    #[tokio::test]
    async fn accepted_children_are_never_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portal");
        let source = MemorySource::new().with_group(
            "portal",
            [
                ("Socket", path.to_str().unwrap()),
                ("Lazy", "yes"),
                ("MultiInstance", "1"),
                ("AcceptSocketConnections", "on"),
            ],
        );
        let mut sup = supervisor(&source);
        sup.activate_all();
        let id = sup.service("portal").unwrap().id();

        for _ in 0..2 {
            let _client = UnixStream::connect(&path).unwrap();
            sup.handle_socket_ready(id);
        }
        assert_eq!(sup.launcher.launches.len(), 2);
        assert!(sup.registry().is_empty());
        assert!(sup.reactor.is_watching(id));
        assert_eq!(sup.service("portal").unwrap().state(), ServiceState::Accepting);
    }

    #[tokio::test]
    async fn invalid_definitions_abort_loading() {
        let source = MemorySource::new().with_group("broken", [("Lazy", "true")]);
        let err = Supervisor::builder(SupervisorConfig::default())
            .load(&source, &StaticAccounts::new())
            .err()
            .unwrap();
        assert_eq!(
            err,
            ConfigError::LazyWithoutSocket {
                service: "broken".into()
            }
        );
    }

    #[tokio::test]
    async fn snapshot_reports_every_service() {
        let d = ServiceDescriptor::builder("manual")
            .executable("/bin/true")
            .keep_alive(true)
            .build()
            .unwrap();
        let mut sup = Supervisor::builder(SupervisorConfig::default())
            .with_launcher(Recorder::default())
            .with_service(d)
            .build()
            .unwrap();

        let json = sup.snapshot_json().unwrap();
        assert!(json.contains("\"pid\": null"), "{json}");

        sup.activate_all();
        let snap = sup.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].pid, sup.service("manual").unwrap().pid().map(Pid::as_raw));
        assert!(snap[0].keep_alive);
    }
}
