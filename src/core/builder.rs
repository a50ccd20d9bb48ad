use std::sync::Arc;

use crate::{
    config::SupervisorConfig,
    error::ConfigError,
    events::Bus,
    launch::{ForkExec, Launch},
    services::{Service, ServiceDescriptor},
    sources::{AccountResolver, ConfigSource},
    subscribers::Subscribe,
};

use super::{registry::ServiceId, supervisor::Supervisor};

/// Builder for constructing a [`Supervisor`] from service definitions.
pub struct SupervisorBuilder<L = ForkExec> {
    cfg: SupervisorConfig,
    subscribers: Vec<Arc<dyn Subscribe>>,
    descriptors: Vec<ServiceDescriptor>,
    launcher: L,
}

impl SupervisorBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: SupervisorConfig) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            descriptors: Vec::new(),
            launcher: ForkExec,
        }
    }
}

impl<L: Launch> SupervisorBuilder<L> {
    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive lifecycle events through dedicated workers with
    /// bounded queues once [`Supervisor::run`] starts.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Replaces the process launcher.
    pub fn with_launcher<M: Launch>(self, launcher: M) -> SupervisorBuilder<M> {
        SupervisorBuilder {
            cfg: self.cfg,
            subscribers: self.subscribers,
            descriptors: self.descriptors,
            launcher,
        }
    }

    /// Adds an already built definition.
    pub fn with_service(mut self, descriptor: ServiceDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    /// Loads one definition per group of `source`, in source order.
    ///
    /// The first malformed definition aborts loading.
    pub fn load(
        mut self,
        source: &dyn ConfigSource,
        accounts: &dyn AccountResolver,
    ) -> Result<Self, ConfigError> {
        for name in source.groups() {
            let descriptor = ServiceDescriptor::from_source(&name, source, accounts)?;
            self.descriptors.push(descriptor);
        }
        Ok(self)
    }

    /// Builds the supervisor.
    ///
    /// Every service is created here; whether it is enabled is decided once,
    /// against `cfg.boot_mode`.
    pub fn build(self) -> Result<Supervisor<L>, ConfigError> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());

        let mut services = Vec::with_capacity(self.descriptors.len());
        for (index, descriptor) in self.descriptors.into_iter().enumerate() {
            let enabled = self.cfg.is_enabled(descriptor.boot_modes());
            if !enabled {
                tracing::debug!(
                    service = descriptor.name(),
                    boot_mode = %self.cfg.boot_mode,
                    "disabled for boot mode"
                );
            }
            services.push(Service::new(ServiceId::new(index), descriptor, enabled)?);
        }

        Ok(Supervisor::new_internal(
            self.cfg,
            bus,
            self.subscribers,
            services,
            self.launcher,
        ))
    }
}
