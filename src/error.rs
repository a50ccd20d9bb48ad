//! Error types used by the servisor runtime.
//!
//! This module defines the error enums of the supervisor:
//!
//! - [`ConfigError`]: a service definition violates an invariant; fatal at load time.
//! - [`SetupError`]: an OS resource needed to activate a service could not be set up.
//! - [`AccountError`]: a configured user name could not be resolved.
//! - [`RuntimeError`]: errors raised by the supervisor run loop itself.
//!
//! Every type provides `as_label` for logs/metrics. Failures that happen inside a
//! freshly forked child never surface here: the child terminates and its exit is
//! handled like any other fast failure.

use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// # Invalid service definitions.
///
/// Raised while turning configuration entries into a
/// [`ServiceDescriptor`](crate::ServiceDescriptor). A definition is never
/// silently coerced into something valid.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// `Lazy` was set without a `Socket`.
    #[error("service {service}: lazy activation requires a socket path")]
    LazyWithoutSocket {
        /// Service name.
        service: String,
    },

    /// `AcceptSocketConnections` was set without `Socket`, `Lazy` and `MultiInstance`.
    #[error("service {service}: accepting socket connections requires a socket path, lazy and multi-instance")]
    AcceptRequirements {
        /// Service name.
        service: String,
    },

    /// `MultiInstance` and `KeepAlive` were both set.
    #[error("service {service}: multi-instance services cannot be kept alive")]
    MultiInstanceKeepAlive {
        /// Service name.
        service: String,
    },

    /// The socket path does not fit into `sockaddr_un`.
    #[error("service {service}: socket path {path:?} is {len} bytes, limit is {max}")]
    SocketPathTooLong {
        /// Service name.
        service: String,
        /// Offending path.
        path: PathBuf,
        /// Path length in bytes.
        len: usize,
        /// Longest accepted path in bytes (without the trailing NUL).
        max: usize,
    },

    /// `Priority` is not one of `low`, `normal`, `high`.
    #[error("service {service}: unknown priority {value:?}")]
    BadPriority {
        /// Service name.
        service: String,
        /// Rejected value.
        value: String,
    },

    /// `SocketPermissions` is not an octal number.
    #[error("service {service}: socket permissions {value:?} are not octal")]
    BadPermissions {
        /// Service name.
        service: String,
        /// Rejected value.
        value: String,
    },

    /// A string entry contains an interior NUL byte and cannot be passed to `exec`.
    #[error("service {service}: {key} contains a NUL byte")]
    InteriorNul {
        /// Service name.
        service: String,
        /// Configuration key.
        key: &'static str,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use servisor::ConfigError;
    ///
    /// let err = ConfigError::LazyWithoutSocket { service: "clock".into() };
    /// assert_eq!(err.as_label(), "config_lazy_without_socket");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::LazyWithoutSocket { .. } => "config_lazy_without_socket",
            ConfigError::AcceptRequirements { .. } => "config_accept_requirements",
            ConfigError::MultiInstanceKeepAlive { .. } => "config_multi_instance_keep_alive",
            ConfigError::SocketPathTooLong { .. } => "config_socket_path_too_long",
            ConfigError::BadPriority { .. } => "config_bad_priority",
            ConfigError::BadPermissions { .. } => "config_bad_permissions",
            ConfigError::InteriorNul { .. } => "config_interior_nul",
        }
    }
}

/// # Failures while preparing OS resources for a service.
///
/// Any of these leaves the affected service unable to start. They are never
/// retried: an unbindable socket path is a misconfiguration, not a transient error.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SetupError {
    /// Parent directories of the socket path could not be created.
    #[error("create directory {path:?}: {source}")]
    CreateDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A socket-level syscall failed (`op` names it: socket, bind, chown, chmod, listen, accept, unlink).
    #[error("{op} {path:?}: {errno}")]
    Socket {
        /// Failing operation.
        op: &'static str,
        /// Socket path.
        path: PathBuf,
        /// OS error.
        errno: Errno,
    },

    /// `fork` failed in the supervisor.
    #[error("fork: {0}")]
    Fork(Errno),

    /// The readiness notification for a socket could not be registered.
    #[error("register readiness for fd {fd}: {source}")]
    Watch {
        /// Descriptor that could not be registered.
        fd: i32,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

impl SetupError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            SetupError::CreateDir { .. } => "setup_create_dir",
            SetupError::Socket { .. } => "setup_socket",
            SetupError::Fork(_) => "setup_fork",
            SetupError::Watch { .. } => "setup_watch",
        }
    }

    /// True if the error only means "nothing to do right now" (e.g. `accept` on a drained queue).
    pub fn is_would_block(&self) -> bool {
        matches!(self, SetupError::Socket { errno, .. } if *errno == Errno::EAGAIN)
    }
}

/// # Account lookup failures.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    /// No such user in the account database.
    #[error("no such user {0:?}")]
    NoSuchUser(String),

    /// The account database could not be queried.
    #[error("lookup of {user:?} failed: {errno}")]
    Lookup {
        /// User name being resolved.
        user: String,
        /// OS error.
        errno: Errno,
    },
}

/// # Errors produced by the supervisor run loop.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// A process signal handler (SIGCHLD, SIGTERM, ...) could not be installed.
    #[error("install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn would_block_is_only_eagain() {
        let eagain = SetupError::Socket {
            op: "accept",
            path: PathBuf::from("/tmp/s"),
            errno: Errno::EAGAIN,
        };
        assert!(eagain.is_would_block());

        let other = SetupError::Socket {
            op: "accept",
            path: PathBuf::from("/tmp/s"),
            errno: Errno::EBADF,
        };
        assert!(!other.is_would_block());
        assert!(!SetupError::Fork(Errno::EAGAIN).is_would_block());
    }

    #[test]
    fn config_error_mentions_service() {
        let err = ConfigError::MultiInstanceKeepAlive {
            service: "shell".into(),
        };
        assert!(err.to_string().contains("shell"));
        assert_eq!(err.as_label(), "config_multi_instance_keep_alive");
    }
}
