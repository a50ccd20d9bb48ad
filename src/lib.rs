//! # servisor
//!
//! **Servisor** is a socket-activated service supervisor.
//!
//! It owns a flat set of declaratively defined background services, brings each
//! to life according to its activation policy (immediately, or on demand when a
//! client connects to its socket), tracks the running process and applies a
//! crash-loop restart policy when it exits.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ConfigSource ──► ServiceDescriptor (validated, immutable)
//!                          │
//!                          ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Supervisor (single-threaded dispatcher)                          │
//! │  - Registry      pid → ServiceId                                  │
//! │  - TokioReactor  readiness of activation sockets                  │
//! │  - Launch        fork/exec (ForkExec)                             │
//! │  - Bus           broadcast events                                 │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐
//!   │ Service  │       │ Service  │       │ Service  │   one state machine each
//!   └┬─────────┘       └┬─────────┘       └┬─────────┘
//!    │ activation socket │ launch plan       │ restart policy
//!    ▼                   ▼                   ▼
//!  bound, listening    child: chdir, nice,  fast failure (< 1s, non-zero)
//!  non-blocking        stdio, fd 3, creds,  1st/2nd: retry, 3rd: give up
//!  socket              env, execve
//! ```
//!
//! ### Lifecycle
//! ```text
//! Inactive ──activate()──► Listening ──ready──► Running ──exit──► (keep-alive?) ──► activate()
//!    │                        │                                       │
//!    └──(not lazy)──► Running └──ready (accept)──► Accepting          └──► GivenUp
//! ```
//!
//! ## Features
//! | Area              | Description                                                   | Key types / traits                          |
//! |-------------------|---------------------------------------------------------------|---------------------------------------------|
//! | **Supervision**   | Own services, route exits and socket readiness.               | [`Supervisor`], [`Service`]                 |
//! | **Definitions**   | Validated, immutable service definitions.                     | [`ServiceDescriptor`], [`ConfigSource`]     |
//! | **Launching**     | Pre-encoded fork/exec with socket takeover.                   | [`Launch`], [`ForkExec`], [`LaunchPlan`]    |
//! | **Policies**      | Crash-loop detection and give-up budget.                      | [`RestartPolicy`]                           |
//! | **Subscriber API**| Hook into lifecycle events (logging, metrics, alerts).        | [`Subscribe`], [`Event`]                    |
//! | **Errors**        | Typed configuration, setup and runtime errors.                | [`ConfigError`], [`SetupError`]             |
//! | **Introspection** | Serializable per-service snapshots.                           | [`ServiceSnapshot`]                         |
//!
//! ## Optional features
//! - `logging` (default): exports [`LogWriter`], which renders events through `tracing`.
//!
//! ## Example
//! ```no_run
//! use std::sync::Arc;
//! use servisor::{MemorySource, Supervisor, SupervisorConfig, SystemAccounts};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let source = MemorySource::new()
//!         .with_group("clock", [("Executable", "/usr/bin/clockd"), ("KeepAlive", "true")]);
//!
//!     #[cfg(feature = "logging")]
//!     let subs: Vec<Arc<dyn servisor::Subscribe>> = vec![Arc::new(servisor::LogWriter::new())];
//!     #[cfg(not(feature = "logging"))]
//!     let subs: Vec<Arc<dyn servisor::Subscribe>> = Vec::new();
//!
//!     let mut sup = Supervisor::builder(SupervisorConfig::default())
//!         .with_subscribers(subs)
//!         .load(&source, &SystemAccounts)?
//!         .build()?;
//!
//!     sup.run().await?;
//!     Ok(())
//! }
//! ```

mod activation;
mod config;
mod core;
mod error;
mod events;
mod exit;
mod launch;
mod policies;
mod services;
mod sources;
mod subscribers;

// ---- Public re-exports ----

pub use activation::{accept_connection, open_listener};
pub use config::{SupervisorConfig, DEFAULT_BOOT_MODE};
pub use crate::core::{Reactor, Registry, ServiceId, Supervisor, SupervisorBuilder, TokioReactor};
pub use error::{AccountError, ConfigError, RuntimeError, SetupError};
pub use events::{Bus, Event, EventKind};
pub use exit::ExitStatus;
pub use launch::{
    Credentials, ForkExec, Launch, LaunchPlan, Prepared, SETUP_FAILED, SOCKET_TAKEOVER_ENV,
    SOCKET_TAKEOVER_FD,
};
pub use policies::{RestartDecision, RestartPolicy};
pub use services::{
    Priority, Service, ServiceDescriptor, ServiceDescriptorBuilder, ServiceSnapshot, ServiceState,
    DEFAULT_SOCKET_PERMISSIONS, MAX_SOCKET_PATH, SOCKET_PERMISSIONS_MASK,
};
pub use sources::{
    Account, AccountResolver, ConfigSource, MemorySource, StaticAccounts, SystemAccounts,
};
pub use subscribers::{Subscribe, SubscriberSet};

// Built-in subscriber rendering events through `tracing`.
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
