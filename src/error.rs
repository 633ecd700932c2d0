//! Error types used by the hostvisor runtime and hosted units.
//!
//! This module defines two main error enums:
//!
//! - [`HostError`]: errors raised by the host itself (build, run, triggers).
//! - [`UnitError`]: errors raised by a hosted unit's lifecycle operations.
//!
//! Both types provide `as_label` for logs/metrics; [`UnitError::is_retryable`]
//! is what the predefined retry policies match on.

use std::time::Duration;
use thiserror::Error;

/// # Errors produced by the host.
///
/// Build-time misconfiguration is reported synchronously from
/// [`HostBuilder::build`](crate::HostBuilder::build); run-time misuse from the
/// run entry points and [`Supervisor::trigger`](crate::Supervisor::trigger).
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HostError {
    /// The builder already produced a host.
    #[error("host has already been built")]
    AlreadyBuilt,

    /// A configuration value is out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was rejected and why.
        reason: String,
    },

    /// `run_and_block` / `run_once` was called on a host that already ran.
    #[error("host is already running or has already run")]
    AlreadyRunning,

    /// No unit with this name is registered.
    #[error("unknown unit: {name}")]
    UnknownUnit {
        /// Requested unit name.
        name: String,
    },

    /// On-demand triggers are only accepted while running in deferred mode.
    #[error("trigger rejected for unit {name}: {reason}")]
    TriggerRejected {
        /// Requested unit name.
        name: String,
        /// Why the host refused.
        reason: &'static str,
    },
}

impl HostError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use hostvisor::HostError;
    ///
    /// assert_eq!(HostError::AlreadyBuilt.as_label(), "host_already_built");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HostError::AlreadyBuilt => "host_already_built",
            HostError::InvalidConfig { .. } => "host_invalid_config",
            HostError::AlreadyRunning => "host_already_running",
            HostError::UnknownUnit { .. } => "host_unknown_unit",
            HostError::TriggerRejected { .. } => "host_trigger_rejected",
        }
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        HostError::InvalidConfig {
            reason: reason.into(),
        }
    }
}

/// # Errors produced by a hosted unit.
///
/// Returned from [`HostedUnit::start`](crate::HostedUnit::start) and
/// [`HostedUnit::stop`](crate::HostedUnit::stop). Retry policies classify
/// failures by matching on these variants.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    /// Generic failure; may succeed if retried.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Transient remote failure (e.g. HTTP 5xx, 408, 429).
    #[error("transient failure (status {status:?}): {error}")]
    Transient {
        /// Remote status code, when the failure came from a response.
        status: Option<u16>,
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable failure; never matched by the predefined policies.
    #[error("fatal error (no retry): {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },

    /// Operation exceeded its timeout.
    #[error("timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Unit code panicked; caught at the host's recovery boundary.
    #[error("panicked: {info}")]
    Panicked {
        /// Panic payload rendered as text.
        info: String,
    },

    /// Operation observed host cancellation.
    #[error("context cancelled")]
    Canceled,
}

impl UnitError {
    /// Convenience constructor for [`UnitError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        UnitError::Fail {
            error: error.into(),
        }
    }

    /// Convenience constructor for [`UnitError::Fatal`].
    pub fn fatal(error: impl Into<String>) -> Self {
        UnitError::Fatal {
            error: error.into(),
        }
    }

    /// Convenience constructor for [`UnitError::Transient`] carrying a status code.
    pub fn transient(status: u16, error: impl Into<String>) -> Self {
        UnitError::Transient {
            status: Some(status),
            error: error.into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use hostvisor::UnitError;
    /// use std::time::Duration;
    ///
    /// let err = UnitError::Timeout { timeout: Duration::from_secs(1) };
    /// assert_eq!(err.as_label(), "unit_timeout");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            UnitError::Fail { .. } => "unit_failed",
            UnitError::Transient { .. } => "unit_transient",
            UnitError::Fatal { .. } => "unit_fatal",
            UnitError::Timeout { .. } => "unit_timeout",
            UnitError::Panicked { .. } => "unit_panicked",
            UnitError::Canceled => "unit_canceled",
        }
    }

    /// Indicates whether the error is safe to retry.
    ///
    /// Returns `true` for [`UnitError::Fail`], [`UnitError::Transient`] and
    /// [`UnitError::Timeout`].
    ///
    /// # Example
    /// ```
    /// use hostvisor::UnitError;
    ///
    /// assert!(UnitError::fail("boom").is_retryable());
    /// assert!(!UnitError::fatal("nope").is_retryable());
    /// assert!(!UnitError::Canceled.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UnitError::Fail { .. } | UnitError::Transient { .. } | UnitError::Timeout { .. }
        )
    }

    /// Whether this is a transient remote failure: [`UnitError::Transient`]
    /// with a 5xx, 408 or 429 status, or without a status at all.
    pub fn is_transient(&self) -> bool {
        match self {
            UnitError::Transient { status: None, .. } => true,
            UnitError::Transient {
                status: Some(code), ..
            } => *code >= 500 || *code == 408 || *code == 429,
            _ => false,
        }
    }

    /// Whether the unit observed host cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self, UnitError::Canceled)
    }

    /// Builds [`UnitError::Panicked`] from a `catch_unwind` payload.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let info = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        UnitError::Panicked { info }
    }
}
