//! Restart policies.
//!
//! This module groups the knobs that control **whether** a keep-alive service
//! is activated again after its process exits.
//!
//! ## Contents
//! - [`RestartPolicy`] fast-failure window and give-up budget
//! - [`RestartDecision`] outcome of a single exit
//!
//! ## Quick wiring
//! ```text
//! SupervisorConfig { restart: RestartPolicy, .. }
//!      └─► Service::did_exit uses:
//!           - restart.decide(exit, run_time, failures) to re-activate or give up
//! ```

mod restart;

pub use restart::{RestartDecision, RestartPolicy};
