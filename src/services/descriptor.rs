//! # Immutable service definitions.
//!
//! A [`ServiceDescriptor`] is loaded once from a [`ConfigSource`] and never
//! changes afterwards. Every constructor funnels through
//! [`ServiceDescriptorBuilder::build`], which enforces:
//!
//! - lazy activation requires a socket path;
//! - accepting socket connections requires socket path, lazy and multi-instance;
//! - multi-instance is incompatible with keep-alive;
//! - the socket path fits into `sockaddr_un` together with its NUL.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::sources::{Account, AccountResolver, ConfigSource};
use crate::DEFAULT_BOOT_MODE;

/// Default permission bits of an activation socket.
pub const DEFAULT_SOCKET_PERMISSIONS: u32 = 0o600;

/// Mask applied to configured socket permissions (rwx for all classes plus setuid/setgid/sticky).
pub const SOCKET_PERMISSIONS_MASK: u32 = 0o7777;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SUN_PATH_LEN: usize = 108;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SUN_PATH_LEN: usize = 104;

/// Longest socket path accepted, in bytes, leaving room for the trailing NUL.
pub const MAX_SOCKET_PATH: usize = SUN_PATH_LEN - 1;

/// Scheduling priority class of a service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Priority {
    /// Background work.
    Low,
    /// Default.
    #[default]
    Normal,
    /// Latency-sensitive services.
    High,
}

impl Priority {
    /// Parses the `Priority` configuration tag. A missing tag means [`Priority::Normal`].
    pub fn parse(tag: Option<&str>) -> Option<Self> {
        match tag.map(str::trim) {
            None | Some("normal") => Some(Priority::Normal),
            Some("low") => Some(Priority::Low),
            Some("high") => Some(Priority::High),
            Some(_) => None,
        }
    }

    /// Numeric priority reported to introspection.
    pub fn value(self) -> i32 {
        match self {
            Priority::Low => 10,
            Priority::Normal => 30,
            Priority::High => 50,
        }
    }

    /// Absolute niceness the spawned process runs at.
    pub fn nice_value(self) -> i32 {
        match self {
            Priority::Low => 10,
            Priority::Normal => 0,
            Priority::High => -10,
        }
    }
}

/// Declarative definition of one supervised service.
#[derive(Clone, Debug)]
pub struct ServiceDescriptor {
    pub(crate) name: String,
    pub(crate) executable: PathBuf,
    pub(crate) arguments: Vec<String>,
    pub(crate) stdio: Option<PathBuf>,
    pub(crate) priority: Priority,
    pub(crate) keep_alive: bool,
    pub(crate) lazy: bool,
    pub(crate) user: Option<String>,
    pub(crate) account: Option<Account>,
    pub(crate) working_directory: Option<PathBuf>,
    pub(crate) environment: Vec<String>,
    pub(crate) boot_modes: Vec<String>,
    pub(crate) multi_instance: bool,
    pub(crate) accept_socket_connections: bool,
    pub(crate) socket_path: Option<PathBuf>,
    pub(crate) socket_permissions: u32,
}

impl ServiceDescriptor {
    /// Starts a builder for a service named `name`.
    pub fn builder(name: impl Into<String>) -> ServiceDescriptorBuilder {
        ServiceDescriptorBuilder::new(name)
    }

    /// Loads the definition of `name` from `source`, resolving its user through `accounts`.
    ///
    /// A user that cannot be resolved is logged and the service runs under the
    /// supervisor's own identity.
    pub fn from_source(
        name: &str,
        source: &dyn ConfigSource,
        accounts: &dyn AccountResolver,
    ) -> Result<Self, ConfigError> {
        let entry = |key: &str| source.read_entry(name, key);
        let flag = |key: &str| source.read_bool_entry(name, key);

        let priority_tag = entry("Priority");
        let priority =
            Priority::parse(priority_tag.as_deref()).ok_or_else(|| ConfigError::BadPriority {
                service: name.to_string(),
                value: priority_tag.clone().unwrap_or_default(),
            })?;

        let mut builder = ServiceDescriptorBuilder::new(name)
            .executable(entry("Executable").unwrap_or_else(|| format!("/bin/{name}")))
            .arguments(split_whitespace(entry("Arguments")))
            .priority(priority)
            .keep_alive(flag("KeepAlive"))
            .lazy(flag("Lazy"))
            .environment(split_whitespace(entry("Environment")))
            .boot_modes(
                entry("BootModes")
                    .unwrap_or_else(|| DEFAULT_BOOT_MODE.to_string())
                    .split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>(),
            )
            .multi_instance(flag("MultiInstance"))
            .accept_socket_connections(flag("AcceptSocketConnections"));

        if let Some(stdio) = entry("StdIO") {
            builder = builder.stdio(stdio);
        }
        if let Some(dir) = entry("WorkingDirectory") {
            builder = builder.working_directory(dir);
        }
        if let Some(socket) = entry("Socket") {
            builder = builder.socket(socket);
        }
        if let Some(perms) = entry("SocketPermissions") {
            builder = builder.socket_permissions(parse_permissions(name, &perms)?);
        }
        if let Some(user) = entry("User") {
            builder = match accounts.resolve(&user) {
                Ok(account) => builder.account(account),
                Err(err) => {
                    tracing::warn!(service = name, user = %user, error = %err, "failed to resolve user");
                    builder.user(user)
                }
            };
        }

        builder.build()
    }

    /// Service name (configuration group).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Executable path; also `argv[0]`.
    pub fn executable(&self) -> &std::path::Path {
        &self.executable
    }

    /// Extra arguments after `argv[0]`.
    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// File stdio is redirected to, if any.
    pub fn stdio(&self) -> Option<&std::path::Path> {
        self.stdio.as_deref()
    }

    /// Scheduling priority.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Restart on exit.
    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Start on first connection instead of immediately.
    pub fn lazy(&self) -> bool {
        self.lazy
    }

    /// Configured user name, resolved or not.
    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Resolved account, if the user could be resolved.
    pub fn account(&self) -> Option<&Account> {
        self.account.as_ref()
    }

    /// Working directory of the spawned process.
    pub fn working_directory(&self) -> Option<&std::path::Path> {
        self.working_directory.as_deref()
    }

    /// `KEY=VALUE` assignments applied before `exec`.
    pub fn environment(&self) -> &[String] {
        &self.environment
    }

    /// Boot modes this service is enabled under.
    pub fn boot_modes(&self) -> &[String] {
        &self.boot_modes
    }

    /// Spawn untracked instances instead of one tracked process.
    pub fn multi_instance(&self) -> bool {
        self.multi_instance
    }

    /// Fork a fresh instance per accepted connection.
    pub fn accept_socket_connections(&self) -> bool {
        self.accept_socket_connections
    }

    /// Activation socket path.
    pub fn socket_path(&self) -> Option<&std::path::Path> {
        self.socket_path.as_deref()
    }

    /// Permission bits of the activation socket.
    pub fn socket_permissions(&self) -> u32 {
        self.socket_permissions
    }
}

/// Fluent builder for [`ServiceDescriptor`].
#[derive(Clone, Debug)]
pub struct ServiceDescriptorBuilder {
    inner: ServiceDescriptor,
}

impl ServiceDescriptorBuilder {
    /// Creates a builder with `/bin/<name>` as executable and all flags off.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            inner: ServiceDescriptor {
                executable: PathBuf::from(format!("/bin/{name}")),
                name,
                arguments: Vec::new(),
                stdio: None,
                priority: Priority::Normal,
                keep_alive: false,
                lazy: false,
                user: None,
                account: None,
                working_directory: None,
                environment: Vec::new(),
                boot_modes: vec![DEFAULT_BOOT_MODE.to_string()],
                multi_instance: false,
                accept_socket_connections: false,
                socket_path: None,
                socket_permissions: DEFAULT_SOCKET_PERMISSIONS,
            },
        }
    }

    pub fn executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.executable = path.into();
        self
    }

    pub fn arguments<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.arguments = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn stdio(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.stdio = Some(path.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.inner.priority = priority;
        self
    }

    pub fn keep_alive(mut self, on: bool) -> Self {
        self.inner.keep_alive = on;
        self
    }

    pub fn lazy(mut self, on: bool) -> Self {
        self.inner.lazy = on;
        self
    }

    /// Records a user name without a resolved account.
    pub fn user(mut self, name: impl Into<String>) -> Self {
        self.inner.user = Some(name.into());
        self
    }

    /// Runs the service as `account`.
    pub fn account(mut self, account: Account) -> Self {
        self.inner.user = Some(account.name.clone());
        self.inner.account = Some(account);
        self
    }

    pub fn working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.inner.working_directory = Some(dir.into());
        self
    }

    pub fn environment<I, S>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.environment = vars.into_iter().map(Into::into).collect();
        self
    }

    pub fn boot_modes<I, S>(mut self, modes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inner.boot_modes = modes.into_iter().map(Into::into).collect();
        self
    }

    pub fn multi_instance(mut self, on: bool) -> Self {
        self.inner.multi_instance = on;
        self
    }

    pub fn accept_socket_connections(mut self, on: bool) -> Self {
        self.inner.accept_socket_connections = on;
        self
    }

    pub fn socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.inner.socket_path = Some(path.into());
        self
    }

    /// Sets permission bits; anything outside [`SOCKET_PERMISSIONS_MASK`] is dropped.
    pub fn socket_permissions(mut self, mode: u32) -> Self {
        self.inner.socket_permissions = mode & SOCKET_PERMISSIONS_MASK;
        self
    }

    /// Checks the definition invariants and returns the descriptor.
    pub fn build(self) -> Result<ServiceDescriptor, ConfigError> {
        let d = self.inner;
        let service = || d.name.clone();

        if d.lazy && d.socket_path.is_none() {
            return Err(ConfigError::LazyWithoutSocket { service: service() });
        }
        if d.accept_socket_connections && !(d.socket_path.is_some() && d.lazy && d.multi_instance)
        {
            return Err(ConfigError::AcceptRequirements { service: service() });
        }
        if d.multi_instance && d.keep_alive {
            return Err(ConfigError::MultiInstanceKeepAlive { service: service() });
        }
        if let Some(path) = &d.socket_path {
            let len = path.as_os_str().len();
            if len > MAX_SOCKET_PATH {
                return Err(ConfigError::SocketPathTooLong {
                    service: service(),
                    path: path.clone(),
                    len,
                    max: MAX_SOCKET_PATH,
                });
            }
        }
        Ok(d)
    }
}

fn split_whitespace(value: Option<String>) -> Vec<String> {
    value
        .map(|v| v.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}

fn parse_permissions(service: &str, value: &str) -> Result<u32, ConfigError> {
    u32::from_str_radix(value.trim(), 8)
        .map(|mode| mode & SOCKET_PERMISSIONS_MASK)
        .map_err(|_| ConfigError::BadPermissions {
            service: service.to_string(),
            value: value.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{MemorySource, StaticAccounts, SystemAccounts};
    use nix::unistd::{Gid, Uid};

    fn load(entries: &[(&str, &str)]) -> Result<ServiceDescriptor, ConfigError> {
        let src = MemorySource::new().with_group("svc", entries.iter().copied());
        ServiceDescriptor::from_source("svc", &src, &StaticAccounts::new())
    }

    #[test]
    fn defaults_from_empty_group() {
        let d = load(&[]).unwrap();
        assert_eq!(d.executable(), std::path::Path::new("/bin/svc"));
        assert!(d.arguments().is_empty());
        assert_eq!(d.priority(), Priority::Normal);
        assert_eq!(d.boot_modes(), ["graphical".to_string()]);
        assert_eq!(d.socket_permissions(), 0o600);
        assert!(!d.keep_alive() && !d.lazy() && !d.multi_instance());
    }

    #[test]
    fn full_definition() {
        let d = load(&[
            ("Executable", "/usr/bin/clock"),
            ("Arguments", "--tick  1 -v"),
            ("StdIO", "/dev/tty0"),
            ("Priority", "high"),
            ("KeepAlive", "true"),
            ("Environment", "A=1 B=two"),
            ("BootModes", "text, graphical"),
            ("Socket", "/tmp/portal/clock"),
            ("SocketPermissions", "0660"),
            ("WorkingDirectory", "/var"),
        ])
        .unwrap();
        assert_eq!(d.arguments(), ["--tick", "1", "-v"]);
        assert_eq!(d.environment(), ["A=1", "B=two"]);
        assert_eq!(d.boot_modes(), ["text", "graphical"]);
        assert_eq!(d.priority().value(), 50);
        assert_eq!(d.socket_permissions(), 0o660);
        assert_eq!(d.working_directory(), Some(std::path::Path::new("/var")));
    }

    #[test]
    fn lazy_requires_socket() {
        let err = load(&[("Lazy", "true")]).unwrap_err();
        assert!(matches!(err, ConfigError::LazyWithoutSocket { .. }));
        assert!(load(&[("Lazy", "true"), ("Socket", "/tmp/s")]).is_ok());
    }

    #[test]
    fn accept_requires_socket_lazy_and_multi_instance() {
        let full = [
            ("AcceptSocketConnections", "true"),
            ("Socket", "/tmp/s"),
            ("Lazy", "true"),
            ("MultiInstance", "true"),
        ];
        assert!(load(&full).is_ok());

        for skip in 1..full.len() {
            let partial: Vec<_> = full
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != skip)
                .map(|(_, kv)| *kv)
                .collect();
            let err = load(&partial).unwrap_err();
            // Dropping the socket while keeping Lazy trips the lazy invariant first.
            assert!(
                matches!(
                    err,
                    ConfigError::AcceptRequirements { .. } | ConfigError::LazyWithoutSocket { .. }
                ),
                "{partial:?} -> {err:?}"
            );
        }
    }

    #[test]
    fn multi_instance_rejects_keep_alive() {
        let err = load(&[("MultiInstance", "true"), ("KeepAlive", "true")]).unwrap_err();
        assert!(matches!(err, ConfigError::MultiInstanceKeepAlive { .. }));
    }

    #[test]
    fn socket_path_limit() {
        let ok = format!("/{}", "s".repeat(MAX_SOCKET_PATH - 1));
        assert!(load(&[("Socket", ok.as_str())]).is_ok());

        let long = format!("/{}", "s".repeat(MAX_SOCKET_PATH));
        let err = load(&[("Socket", long.as_str())]).unwrap_err();
        assert!(matches!(err, ConfigError::SocketPathTooLong { len, .. } if len == MAX_SOCKET_PATH + 1));
    }

    #[test]
    fn malformed_tags_are_rejected() {
        assert!(matches!(
            load(&[("Priority", "urgent")]).unwrap_err(),
            ConfigError::BadPriority { .. }
        ));
        assert!(matches!(
            load(&[("Socket", "/tmp/s"), ("SocketPermissions", "rw-")]).unwrap_err(),
            ConfigError::BadPermissions { .. }
        ));
    }

    #[test]
    fn permissions_are_masked() {
        let d = load(&[("Socket", "/tmp/s"), ("SocketPermissions", "177777")]).unwrap();
        assert_eq!(d.socket_permissions(), 0o7777);
    }

    #[test]
    fn user_resolution() {
        let acct = Account {
            name: "anon".into(),
            uid: Uid::from_raw(200),
            gid: Gid::from_raw(200),
            extra_gids: vec![],
            home: "/home/anon".into(),
        };
        let src = MemorySource::new()
            .with_group("a", [("User", "anon")])
            .with_group("b", [("User", "ghost")]);
        let accounts = StaticAccounts::new().with(acct.clone());

        let a = ServiceDescriptor::from_source("a", &src, &accounts).unwrap();
        assert_eq!(a.account(), Some(&acct));

        let b = ServiceDescriptor::from_source("b", &src, &accounts).unwrap();
        assert_eq!(b.user(), Some("ghost"));
        assert!(b.account().is_none());

        let root = ServiceDescriptor::from_source(
            "r",
            &MemorySource::new().with_group("r", [("User", "root")]),
            &SystemAccounts,
        )
        .unwrap();
        assert_eq!(root.account().map(|a| a.uid), Some(Uid::from_raw(0)));
    }
}
