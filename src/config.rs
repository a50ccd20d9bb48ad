//! # Global runtime configuration.
//!
//! Provides [`SupervisorConfig`] centralized settings for the supervisor runtime.
//!
//! Config is used in two ways:
//! 1. **Supervisor creation**: `Supervisor::builder(config)`
//! 2. **Service evaluation**: the boot-mode membership test and the restart policy
//!    every keep-alive service consults after an exit.

use crate::policies::RestartPolicy;

/// Boot mode a service is enabled under when it lists none.
pub const DEFAULT_BOOT_MODE: &str = "graphical";

/// Global configuration for the supervisor runtime.
///
/// ## Field semantics
/// - `boot_mode`: tag of the current run; services not listing it stay inactive
/// - `bus_capacity`: Event bus ring buffer size (min 1; clamped by Bus)
/// - `restart`: crash-loop constants shared by every keep-alive service
/// - `listen_backlog`: backlog for activation sockets
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Boot mode of the current supervisor run.
    pub boot_mode: String,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items.
    pub bus_capacity: usize,

    /// Fast-failure window and give-up budget.
    pub restart: RestartPolicy,

    /// Pending-connection backlog of activation sockets.
    ///
    /// Services expect a handful of simultaneous connection attempts, not a
    /// request-serving workload.
    pub listen_backlog: i32,
}

impl SupervisorConfig {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// The single "is this service enabled now" query.
    #[inline]
    pub fn is_enabled(&self, boot_modes: &[String]) -> bool {
        boot_modes.iter().any(|mode| *mode == self.boot_mode)
    }

    /// Returns a copy running under `mode`.
    pub fn with_boot_mode(mut self, mode: impl Into<String>) -> Self {
        self.boot_mode = mode.into();
        self
    }
}

impl Default for SupervisorConfig {
    /// Default configuration:
    ///
    /// - `boot_mode = "graphical"`
    /// - `bus_capacity = 1024`
    /// - `restart = RestartPolicy::default()` (give up on the third fast failure under 1s)
    /// - `listen_backlog = 16`
    fn default() -> Self {
        Self {
            boot_mode: DEFAULT_BOOT_MODE.to_string(),
            bus_capacity: 1024,
            restart: RestartPolicy::default(),
            listen_backlog: 16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_mode_membership() {
        let cfg = SupervisorConfig::default().with_boot_mode("text");
        assert!(cfg.is_enabled(&["graphical".into(), "text".into()]));
        assert!(!cfg.is_enabled(&["graphical".into()]));
        assert!(!cfg.is_enabled(&[]));
    }

    #[test]
    fn bus_capacity_never_zero() {
        let cfg = SupervisorConfig {
            bus_capacity: 0,
            ..SupervisorConfig::default()
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
