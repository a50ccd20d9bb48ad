use std::collections::HashMap;
use std::ffi::CString;
use std::path::PathBuf;

use nix::unistd::{Gid, Uid, User};

use crate::error::AccountError;

/// Resolved identity a service runs under.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Account {
    /// User name as configured.
    pub name: String,
    /// Numeric user id.
    pub uid: Uid,
    /// Primary group id.
    pub gid: Gid,
    /// Supplementary group ids.
    pub extra_gids: Vec<Gid>,
    /// Home directory, exported as `HOME` to the service.
    pub home: PathBuf,
}

/// Resolves user names to [`Account`]s.
pub trait AccountResolver {
    /// Looks up `name`.
    fn resolve(&self, name: &str) -> Result<Account, AccountError>;
}

/// Resolver backed by the system account database (`getpwnam`, `getgrouplist`).
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemAccounts;

impl AccountResolver for SystemAccounts {
    fn resolve(&self, name: &str) -> Result<Account, AccountError> {
        let user = User::from_name(name)
            .map_err(|errno| AccountError::Lookup {
                user: name.to_string(),
                errno,
            })?
            .ok_or_else(|| AccountError::NoSuchUser(name.to_string()))?;

        let cname = CString::new(name).map_err(|_| AccountError::NoSuchUser(name.to_string()))?;
        let groups = nix::unistd::getgrouplist(&cname, user.gid).map_err(|errno| {
            AccountError::Lookup {
                user: name.to_string(),
                errno,
            }
        })?;
        let extra_gids = groups.into_iter().filter(|g| *g != user.gid).collect();

        Ok(Account {
            name: user.name,
            uid: user.uid,
            gid: user.gid,
            extra_gids,
            home: user.dir,
        })
    }
}

/// Fixed table of accounts, for tests and embedded setups without a user database.
#[derive(Clone, Debug, Default)]
pub struct StaticAccounts {
    accounts: HashMap<String, Account>,
}

impl StaticAccounts {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an account, keyed by its name.
    pub fn with(mut self, account: Account) -> Self {
        self.accounts.insert(account.name.clone(), account);
        self
    }
}

impl AccountResolver for StaticAccounts {
    fn resolve(&self, name: &str) -> Result<Account, AccountError> {
        self.accounts
            .get(name)
            .cloned()
            .ok_or_else(|| AccountError::NoSuchUser(name.to_string()))
    }
}
