//! External collaborators consumed through narrow interfaces.
//!
//! - [`ConfigSource`]: string-valued entries per service group; parsing of the
//!   underlying file format is not this crate's concern.
//! - [`AccountResolver`]: user name → uid/gid/groups/home.

mod accounts;
mod memory;

pub use accounts::{Account, AccountResolver, StaticAccounts, SystemAccounts};
pub use memory::MemorySource;

/// Pull-based view of the service configuration.
pub trait ConfigSource {
    /// Names of all configured service groups, in definition order.
    fn groups(&self) -> Vec<String>;

    /// Raw value of `key` in `group`, if present.
    fn read_entry(&self, group: &str, key: &str) -> Option<String>;

    /// Boolean entry; `true`, `yes`, `on` and `1` (any case) are true, anything else false.
    fn read_bool_entry(&self, group: &str, key: &str) -> bool {
        self.read_entry(group, key)
            .map(|v| {
                matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "1" | "true" | "yes" | "on"
                )
            })
            .unwrap_or(false)
    }
}
