//! # Process registry: pid → owning service.
//!
//! The registry routes asynchronous exit notifications back to the service
//! that spawned the process.
//!
//! ## Rules
//! - An entry is added exactly when a tracked spawn succeeds in the parent.
//! - An entry is removed exactly when that process's exit is observed.
//! - Multi-instance children never get an entry; their exits route nowhere.
//! - The registry stores lookup keys only. Services are owned by the supervisor.

use std::collections::HashMap;
use std::fmt;

use nix::unistd::Pid;

/// Index of a service inside its supervisor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(usize);

impl ServiceId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Position of the service in [`Supervisor::services`](crate::Supervisor::services).
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Table of tracked processes.
#[derive(Debug, Default)]
pub struct Registry {
    by_pid: HashMap<Pid, ServiceId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `pid` as owned by `id`. Returns the previous owner, if the pid was reused
    /// before its exit was observed.
    pub fn insert(&mut self, pid: Pid, id: ServiceId) -> Option<ServiceId> {
        self.by_pid.insert(pid, id)
    }

    /// Forgets `pid`.
    pub fn remove(&mut self, pid: Pid) -> Option<ServiceId> {
        self.by_pid.remove(&pid)
    }

    /// Owner of `pid`.
    pub fn get(&self, pid: Pid) -> Option<ServiceId> {
        self.by_pid.get(&pid).copied()
    }

    pub fn contains(&self, pid: Pid) -> bool {
        self.by_pid.contains_key(&pid)
    }

    /// Number of tracked processes.
    pub fn len(&self) -> usize {
        self.by_pid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_pid.is_empty()
    }
}
