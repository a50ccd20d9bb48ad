//! Service definitions and their runtime state machines.
//!
//! ## Contents
//! - [`ServiceDescriptor`] immutable definition (+ [`ServiceDescriptorBuilder`], [`Priority`])
//! - [`Service`] lifecycle state machine driven by the supervisor
//! - [`ServiceSnapshot`] serializable diagnostic view

mod descriptor;
mod service;
mod snapshot;

pub use descriptor::{
    Priority, ServiceDescriptor, ServiceDescriptorBuilder, DEFAULT_SOCKET_PERMISSIONS,
    MAX_SOCKET_PATH, SOCKET_PERMISSIONS_MASK,
};
pub use service::{Service, ServiceState};
pub use snapshot::ServiceSnapshot;

pub(crate) use service::Context;

#[cfg(test)]
pub(crate) use service::tests::Recorder;
