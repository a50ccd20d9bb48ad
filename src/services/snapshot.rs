//! Read-only diagnostic projection of a service, for external tooling.

use std::path::PathBuf;

use nix::unistd::Pid;
use serde::Serialize;

use super::descriptor::ServiceDescriptor;
use super::service::ServiceState;

/// Point-in-time view of one service. Serializes with `pid: null` when not running.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceSnapshot {
    pub name: String,
    pub executable_path: PathBuf,
    pub stdio_file_path: Option<PathBuf>,
    /// Numeric priority: 10 (low), 30 (normal), 50 (high).
    pub priority: i32,
    pub keep_alive: bool,
    pub socket_path: Option<PathBuf>,
    pub socket_permissions: u32,
    pub lazy: bool,
    pub user: Option<String>,
    pub multi_instance: bool,
    pub accept_socket_connections: bool,
    pub pid: Option<i32>,
    pub restart_attempts: u32,
    pub working_directory: Option<PathBuf>,
    pub state: ServiceState,
}

impl ServiceSnapshot {
    pub(crate) fn new(
        d: &ServiceDescriptor,
        pid: Option<Pid>,
        restart_attempts: u32,
        state: ServiceState,
    ) -> Self {
        Self {
            name: d.name().to_string(),
            executable_path: d.executable().to_path_buf(),
            stdio_file_path: d.stdio().map(PathBuf::from),
            priority: d.priority().value(),
            keep_alive: d.keep_alive(),
            socket_path: d.socket_path().map(PathBuf::from),
            socket_permissions: d.socket_permissions(),
            lazy: d.lazy(),
            user: d.user().map(String::from),
            multi_instance: d.multi_instance(),
            accept_socket_connections: d.accept_socket_connections(),
            pid: pid.map(Pid::as_raw),
            restart_attempts,
            working_directory: d.working_directory().map(PathBuf::from),
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::Priority;

    #[test]
    fn serializes_null_pid_when_not_running() {
        let d = ServiceDescriptor::builder("clock")
            .priority(Priority::High)
            .socket("/tmp/portal/clock")
            .lazy(true)
            .socket_permissions(0o660)
            .build()
            .unwrap();
        let snap = ServiceSnapshot::new(&d, None, 2, ServiceState::Listening);
        let json = serde_json::to_value(&snap).unwrap();

        assert_eq!(json["pid"], serde_json::Value::Null);
        assert_eq!(json["priority"], 50);
        assert_eq!(json["socket_permissions"], 0o660);
        assert_eq!(json["restart_attempts"], 2);
        assert_eq!(json["executable_path"], "/bin/clock");
        assert_eq!(json["state"], "listening");
    }

    #[test]
    fn running_pid_is_reported() {
        let d = ServiceDescriptor::builder("echo").build().unwrap();
        let snap = ServiceSnapshot::new(&d, Some(Pid::from_raw(77)), 0, ServiceState::Running);
        assert_eq!(snap.pid, Some(77));
        assert_eq!(snap.stdio_file_path, None);
    }
}
