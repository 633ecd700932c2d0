//! # Global host configuration.
//!
//! Provides [`HostConfig`], centralized settings for the supervisor runtime,
//! and [`StartMode`], the dispatch choice for `run_and_block`.
//!
//! ## Sentinel values
//! - `monitor_interval = 0s` → background monitor disabled
//!
//! Validation happens once, in [`HostBuilder::build`](crate::HostBuilder::build).

use std::time::Duration;

use crate::error::HostError;

/// How `run_and_block` dispatches unit starts.
///
/// `run_once` always starts units sequentially.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum StartMode {
    /// Every start is spawned at once, in registration order (default).
    #[default]
    Concurrent,
    /// Each start (with retries) resolves before the next begins.
    Sequential,
}

/// Global configuration for the host runtime.
///
/// ## Field semantics
/// - `grace`: bound for each unit's stop and for outstanding starts after shutdown
/// - `start_mode`: dispatch of starts in `run_and_block`
/// - `monitor_interval`: liveness tick period (`0s` = disabled)
/// - `fallback_timeout`: start ceiling when no retry policy is configured
/// - `bus_capacity`: event bus ring buffer size (min 1)
/// - `handle_signals`: route SIGINT/SIGTERM/SIGQUIT/SIGHUP/Ctrl-C into the stop sequence
/// - `environment`: logical environment name exposed via [`SystemInfo`](crate::SystemInfo)
#[derive(Clone, Debug)]
pub struct HostConfig {
    /// Upper bound for a single unit's stop, and for draining outstanding starts.
    pub grace: Duration,

    /// Dispatch of starts in `run_and_block`.
    pub start_mode: StartMode,

    /// Background monitor period; `Duration::ZERO` disables it.
    pub monitor_interval: Duration,

    /// Start ceiling applied when the retry chain is empty, unless the chain
    /// sets its own.
    pub fallback_timeout: Duration,

    /// Capacity of the event bus broadcast channel.
    pub bus_capacity: usize,

    /// Whether OS signals trigger the stop sequence.
    pub handle_signals: bool,

    /// Logical environment name.
    pub environment: String,
}

impl HostConfig {
    /// Smallest accepted non-zero monitor interval.
    pub const MIN_MONITOR_INTERVAL: Duration = Duration::from_millis(1);

    /// Monitor interval as an `Option` (`None` = disabled).
    #[inline]
    pub fn monitor_interval(&self) -> Option<Duration> {
        if self.monitor_interval.is_zero() {
            None
        } else {
            Some(self.monitor_interval)
        }
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Rejects values the runtime cannot honor.
    pub fn validate(&self) -> Result<(), HostError> {
        if self.grace.is_zero() {
            return Err(HostError::invalid("grace must be greater than zero"));
        }
        if self.fallback_timeout.is_zero() {
            return Err(HostError::invalid("fallback_timeout must be greater than zero"));
        }
        if let Some(interval) = self.monitor_interval() {
            if interval < Self::MIN_MONITOR_INTERVAL {
                return Err(HostError::invalid(format!(
                    "monitor_interval {interval:?} is below {:?}",
                    Self::MIN_MONITOR_INTERVAL
                )));
            }
        }
        Ok(())
    }
}

impl Default for HostConfig {
    /// Default configuration:
    ///
    /// - `grace = 30s`
    /// - `start_mode = Concurrent`
    /// - `monitor_interval = 0s` (disabled)
    /// - `fallback_timeout = 60s`
    /// - `bus_capacity = 1024`
    /// - `handle_signals = true`
    /// - `environment = "production"`
    fn default() -> Self {
        Self {
            grace: Duration::from_secs(30),
            start_mode: StartMode::default(),
            monitor_interval: Duration::ZERO,
            fallback_timeout: Duration::from_secs(60),
            bus_capacity: 1024,
            handle_signals: true,
            environment: "production".to_string(),
        }
    }
}
