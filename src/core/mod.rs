//! Runtime core: dispatch and book-keeping.
//!
//! Internal modules:
//! - [`registry`]: pid → service routing for exit notifications;
//! - [`reactor`]: read-readiness registration for activation sockets;
//! - [`supervisor`]: owns services, registry and reactor; runs the dispatch loop;
//! - [`builder`]: loads service definitions and assembles a supervisor;
//! - [`shutdown`]: termination signal handling.

mod builder;
mod reactor;
mod registry;
mod shutdown;
mod supervisor;

pub use builder::SupervisorBuilder;
pub use reactor::{Reactor, TokioReactor};
pub use registry::{Registry, ServiceId};
pub use supervisor::Supervisor;
