//! # Host construction.
//!
//! [`HostBuilder`] gathers units, retry policies, subscribers and hooks, then
//! [`build`](HostBuilder::build) validates everything and produces an
//! `Arc<Supervisor>`. A builder produces exactly one host.
//!
//! ```text
//! HostBuilder::new(cfg)
//!   .add_unit(..) / .add_lazy_unit(..) / .with_units(..)
//!   .with_retry(..) / .with_retry_chain(..)
//!   .with_subscribers(..) .with_tick(..) .defer_to_triggers(..)
//!   .with_startup(..)
//! build():
//!   startup.configure_configuration(&mut cfg)
//!   cfg.validate()?
//!   startup.configure_logging(&mut subscribers)
//!   startup.configure_services(&mut units)
//!   bus, SubscriberSet, ExecutionContext(SystemInfo), EffectivePolicy
//! ```
//!
//! `build` spawns subscriber workers and therefore must run inside a Tokio
//! runtime.

use std::borrow::Cow;
use std::sync::Arc;

use crate::config::HostConfig;
use crate::context::{ExecutionContext, SystemInfo, TickFn};
use crate::core::supervisor::{Supervisor, SupervisorParts};
use crate::error::HostError;
use crate::events::Bus;
use crate::policies::{RetryPolicy, RetryPolicyChain};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::units::{HostedUnit, UnitRef, UnitRegistry};

/// Application-supplied configuration hooks, applied once by
/// [`HostBuilder::build`].
pub trait Startup: Send + Sync {
    /// Adjusts configuration before it is validated.
    fn configure_configuration(&self, _cfg: &mut HostConfig) {}

    /// Adds event subscribers (log sinks, exporters).
    fn configure_logging(&self, _subscribers: &mut Vec<Arc<dyn Subscribe>>) {}

    /// Registers hosted units.
    fn configure_services(&self, _units: &mut UnitRegistry) {}
}

/// Builder for a [`Supervisor`].
pub struct HostBuilder {
    cfg: HostConfig,
    units: UnitRegistry,
    retry: RetryPolicyChain,
    subscribers: Vec<Arc<dyn Subscribe>>,
    on_tick: Option<TickFn>,
    defer_to_triggers: bool,
    startup: Option<Box<dyn Startup>>,
    built: bool,
}

impl HostBuilder {
    /// Creates a builder with the given configuration.
    pub fn new(cfg: HostConfig) -> Self {
        Self {
            cfg,
            units: UnitRegistry::new(),
            retry: RetryPolicyChain::new(),
            subscribers: Vec::new(),
            on_tick: None,
            defer_to_triggers: false,
            startup: None,
            built: false,
        }
    }

    /// Replaces the registered units.
    pub fn with_units(mut self, units: UnitRegistry) -> Self {
        self.units = units;
        self
    }

    /// Registers an already constructed unit.
    pub fn add_unit(mut self, unit: UnitRef) -> Self {
        self.units.add(unit);
        self
    }

    /// Registers a unit constructed on first use.
    pub fn add_lazy_unit<F, U>(mut self, name: impl Into<Cow<'static, str>>, factory: F) -> Self
    where
        F: Fn() -> U + Send + Sync + 'static,
        U: HostedUnit,
    {
        self.units.add_lazy(name, factory);
        self
    }

    /// Appends a retry policy; the first one added is the outermost layer.
    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry.add(policy);
        self
    }

    /// Replaces the retry chain.
    ///
    /// A fallback timeout set on the chain takes precedence over
    /// [`HostConfig::fallback_timeout`].
    pub fn with_retry_chain(mut self, chain: RetryPolicyChain) -> Self {
        self.retry = chain;
        self
    }

    /// Adds event subscribers.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subscribers);
        self
    }

    /// Callback invoked on every monitor tick with the elapsed run time.
    pub fn with_tick(mut self, on_tick: TickFn) -> Self {
        self.on_tick = Some(on_tick);
        self
    }

    /// When `true`, run entry points start nothing; units run only through
    /// [`Supervisor::trigger`].
    pub fn defer_to_triggers(mut self, defer: bool) -> Self {
        self.defer_to_triggers = defer;
        self
    }

    /// Installs configuration hooks.
    pub fn with_startup(mut self, startup: impl Startup + 'static) -> Self {
        self.startup = Some(Box::new(startup));
        self
    }

    /// Builds the host.
    ///
    /// # Errors
    /// - [`HostError::AlreadyBuilt`] on a second call;
    /// - [`HostError::InvalidConfig`] when validation fails.
    pub fn build(&mut self) -> Result<Arc<Supervisor>, HostError> {
        if self.built {
            return Err(HostError::AlreadyBuilt);
        }

        let mut cfg = self.cfg.clone();
        if let Some(startup) = &self.startup {
            startup.configure_configuration(&mut cfg);
        }
        cfg.validate()?;
        self.built = true;

        let mut subscribers = std::mem::take(&mut self.subscribers);
        let mut units = std::mem::take(&mut self.units);
        if let Some(startup) = self.startup.take() {
            startup.configure_logging(&mut subscribers);
            startup.configure_services(&mut units);
        }

        let policy = fallback_from_config(std::mem::take(&mut self.retry), &cfg).build_effective();
        let bus = Bus::new(cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(subscribers, bus.clone());
        let ctx = Arc::new(ExecutionContext::new(
            cfg.monitor_interval(),
            SystemInfo::capture(cfg.environment.clone()),
            self.on_tick.take(),
        ));

        tracing::debug!(
            units = units.len(),
            subscribers = subs.len(),
            environment = %cfg.environment,
            "host built"
        );

        Ok(Arc::new(Supervisor::new_internal(SupervisorParts {
            cfg,
            units: units.into_entries(),
            policy,
            ctx,
            bus,
            subs,
            defer_to_triggers: self.defer_to_triggers,
        })))
    }
}

/// Applies the configured fallback timeout unless the chain carries its own.
fn fallback_from_config(chain: RetryPolicyChain, cfg: &HostConfig) -> RetryPolicyChain {
    if chain.fallback_timeout() == RetryPolicyChain::DEFAULT_FALLBACK_TIMEOUT {
        chain.with_fallback_timeout(cfg.fallback_timeout)
    } else {
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::units::UnitFn;

    struct Fixed;

    impl Startup for Fixed {
        fn configure_configuration(&self, cfg: &mut HostConfig) {
            cfg.environment = "staging".into();
        }

        fn configure_services(&self, units: &mut UnitRegistry) {
            units.add(UnitFn::new("from-startup", |_ctx, _tok| async { Ok(()) }).arc());
        }
    }

    #[tokio::test]
    async fn second_build_is_rejected() {
        let mut b = HostBuilder::new(HostConfig::default());
        assert!(b.build().is_ok());
        assert_eq!(b.build().err(), Some(HostError::AlreadyBuilt));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let cfg = HostConfig {
            grace: Duration::ZERO,
            ..HostConfig::default()
        };
        let mut b = HostBuilder::new(cfg);
        match b.build() {
            Err(HostError::InvalidConfig { reason }) => assert!(reason.contains("grace")),
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn startup_hooks_are_applied() {
        let sup = HostBuilder::new(HostConfig::default())
            .with_startup(Fixed)
            .build()
            .unwrap();
        assert_eq!(sup.unit_names(), vec!["from-startup"]);
        assert_eq!(sup.context().system_info().environment, "staging");
    }

    #[test]
    fn chain_fallback_timeout_wins_over_config() {
        let cfg = HostConfig {
            fallback_timeout: Duration::from_secs(90),
            ..HostConfig::default()
        };

        let custom = RetryPolicyChain::new().with_fallback_timeout(Duration::from_secs(5));
        assert_eq!(
            fallback_from_config(custom, &cfg).fallback_timeout(),
            Duration::from_secs(5)
        );
        assert_eq!(
            fallback_from_config(RetryPolicyChain::new(), &cfg).fallback_timeout(),
            Duration::from_secs(90)
        );
    }

    struct EnvOnly;

    impl Startup for EnvOnly {
        fn configure_configuration(&self, cfg: &mut HostConfig) {
            cfg.environment = "ci".into();
        }
    }

    #[tokio::test]
    async fn startup_hooks_default_to_empty() {
        let sup = HostBuilder::new(HostConfig::default())
            .with_startup(EnvOnly)
            .build()
            .unwrap();
        assert!(sup.unit_names().is_empty());
        assert_eq!(sup.config().environment, "ci");
    }
}
