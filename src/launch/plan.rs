//! # Launch plans: everything `exec` needs, built before `fork`.
//!
//! The child side of `fork` must not allocate or format, so every C string and
//! every NULL-terminated pointer array is prepared in the supervisor:
//!
//! ```text
//! ServiceDescriptor ──► LaunchPlan::new        (once, at load; rejects NUL bytes)
//!                           └─► prepare(takeover) (per spawn; snapshots the environment)
//!                                   └─► Prepared { argv, envp }  ──► child::run
//! ```

use std::ffi::{CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

use libc::c_char;
use nix::unistd::{Gid, Uid};

use crate::error::ConfigError;
use crate::services::{Priority, ServiceDescriptor};

/// Environment marker telling a service that its socket is already open on [`SOCKET_TAKEOVER_FD`].
pub const SOCKET_TAKEOVER_ENV: &str = "SOCKET_TAKEOVER";

/// Descriptor number a handed-over socket is placed on.
pub const SOCKET_TAKEOVER_FD: i32 = 3;

/// Identity the child switches to before `exec`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub uid: Uid,
    pub gid: Gid,
    pub groups: Vec<Gid>,
}

/// Immutable, pre-encoded description of how to start one service process.
#[derive(Clone, Debug)]
pub struct LaunchPlan {
    pub(crate) service: String,
    pub(crate) path: CString,
    pub(crate) argv: Vec<CString>,
    pub(crate) assignments: Vec<OsString>,
    pub(crate) home: Option<OsString>,
    pub(crate) working_directory: Option<CString>,
    pub(crate) stdio: Option<CString>,
    pub(crate) nice: i32,
    pub(crate) credentials: Option<Credentials>,
}

/// Per-spawn argument and environment vectors, with their pointer arrays.
///
/// The pointer arrays borrow from the owned strings, so a `Prepared` must stay
/// alive (and unmoved strings-wise) until `exec`.
pub struct Prepared {
    _argv: Vec<CString>,
    argv_ptrs: Vec<*const c_char>,
    envp: Vec<CString>,
    envp_ptrs: Vec<*const c_char>,
}

impl Prepared {
    pub(crate) fn argv(&self) -> *const *const c_char {
        self.argv_ptrs.as_ptr()
    }

    pub(crate) fn envp(&self) -> *const *const c_char {
        self.envp_ptrs.as_ptr()
    }

    /// Final environment, mostly for inspection in tests.
    pub fn environment(&self) -> impl Iterator<Item = &[u8]> {
        self.envp.iter().map(|c| c.as_bytes())
    }
}

impl LaunchPlan {
    /// Encodes `descriptor`, rejecting strings that cannot cross into C.
    pub fn new(descriptor: &ServiceDescriptor) -> Result<Self, ConfigError> {
        let nul = |key: &'static str| ConfigError::InteriorNul {
            service: descriptor.name.clone(),
            key,
        };
        let c_os = |s: &OsStr, key: &'static str| {
            CString::new(s.as_bytes().to_vec()).map_err(|_| nul(key))
        };

        let path = c_os(descriptor.executable.as_os_str(), "Executable")?;
        let mut argv = Vec::with_capacity(descriptor.arguments.len() + 1);
        argv.push(path.clone());
        for arg in &descriptor.arguments {
            argv.push(CString::new(arg.as_bytes()).map_err(|_| nul("Arguments"))?);
        }

        let mut assignments = Vec::with_capacity(descriptor.environment.len());
        for var in &descriptor.environment {
            if var.as_bytes().contains(&0) {
                return Err(nul("Environment"));
            }
            assignments.push(OsString::from(var));
        }

        let working_directory = descriptor
            .working_directory
            .as_deref()
            .map(|d| c_os(d.as_os_str(), "WorkingDirectory"))
            .transpose()?;
        let stdio = descriptor
            .stdio
            .as_deref()
            .map(|p| c_os(p.as_os_str(), "StdIO"))
            .transpose()?;

        let (home, credentials) = match &descriptor.account {
            Some(acct) => {
                let mut home = OsString::from("HOME=");
                home.push(acct.home.as_os_str());
                (
                    Some(home),
                    Some(Credentials {
                        uid: acct.uid,
                        gid: acct.gid,
                        groups: acct.extra_gids.clone(),
                    }),
                )
            }
            None => (None, None),
        };

        Ok(Self {
            service: descriptor.name.clone(),
            path,
            argv,
            assignments,
            home,
            working_directory,
            stdio,
            nice: Priority::nice_value(descriptor.priority),
            credentials,
        })
    }

    /// Service this plan belongs to.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Builds argv/envp for one spawn on top of the supervisor's current environment.
    pub fn prepare(&self, takeover: bool) -> Prepared {
        self.prepare_with(std::env::vars_os(), takeover)
    }

    /// Like [`LaunchPlan::prepare`] with an explicit base environment.
    ///
    /// Later entries win: base, then the takeover marker, then `HOME`, then the
    /// service's own assignments. An assignment without `=` removes the variable.
    pub fn prepare_with(
        &self,
        base: impl IntoIterator<Item = (OsString, OsString)>,
        takeover: bool,
    ) -> Prepared {
        let mut vars: Vec<(Vec<u8>, Option<Vec<u8>>)> = Vec::new();
        let mut set = |key: &[u8], value: Option<&[u8]>| {
            let value = value.map(<[u8]>::to_vec);
            match vars.iter_mut().find(|(k, _)| k.as_slice() == key) {
                Some(slot) => slot.1 = value,
                None => vars.push((key.to_vec(), value)),
            }
        };

        for (k, v) in base {
            set(k.as_bytes(), Some(v.as_bytes()));
        }
        if takeover {
            set(SOCKET_TAKEOVER_ENV.as_bytes(), Some(b"1"));
        }
        for assignment in self.home.iter().chain(self.assignments.iter()) {
            let bytes = assignment.as_bytes();
            match bytes.iter().position(|b| *b == b'=') {
                Some(eq) => set(&bytes[..eq], Some(&bytes[eq + 1..])),
                None => set(bytes, None),
            }
        }

        let envp: Vec<CString> = vars
            .into_iter()
            .filter_map(|(mut k, v)| {
                let v = v?;
                k.push(b'=');
                k.extend_from_slice(&v);
                CString::new(k).ok()
            })
            .collect();

        let argv = self.argv.clone();
        let argv_ptrs = null_terminated(&argv);
        let envp_ptrs = null_terminated(&envp);
        Prepared {
            _argv: argv,
            argv_ptrs,
            envp,
            envp_ptrs,
        }
    }
}

fn null_terminated(strings: &[CString]) -> Vec<*const c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}
