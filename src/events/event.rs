//! # Runtime events emitted by the host.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Host lifecycle**: starting, running, shutdown requested, stopped
//! - **Unit lifecycle**: starting, started, canceled, faulted, stopping, stopped
//! - **Policy events**: retry scheduled, fallback timeout hit
//! - **Liveness**: monitor ticks
//!
//! Each event is logged through `tracing` at the level its kind maps to
//! ([`EventKind::level`]) and then published on the [`Bus`](super::Bus).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use hostvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::RetryScheduled)
//!     .with_unit("ingest")
//!     .with_reason("connection refused")
//!     .with_attempt(2)
//!     .with_delay(Duration::from_millis(250));
//!
//! assert_eq!(ev.kind, EventKind::RetryScheduled);
//! assert_eq!(ev.unit.as_deref(), Some("ingest"));
//! assert_eq!(ev.delay_ms, Some(250));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use tracing::Level;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Host lifecycle ===
    /// A run entry point was entered.
    HostStarting,
    /// All unit starts were dispatched.
    HostRunning,
    /// Stop sequence entered. `reason` carries the trigger.
    ShutdownRequested,
    /// Stop sequence finished. `reason` carries the final status.
    HostStopped,
    /// Outstanding starts did not finish within the grace period and were aborted.
    GraceExceeded,

    // === Unit lifecycle ===
    /// Wrapped start of a unit is being invoked.
    UnitStarting,
    /// Wrapped start of a unit resolved successfully.
    UnitStarted,
    /// Unit start observed cancellation (not a fault).
    UnitCanceled,
    /// Unit start failed after its retry budget (or unmatched).
    UnitFaulted,
    /// Error hook returned an error or panicked.
    ErrorHookFailed,
    /// Error hook vetoed shutdown; host keeps running in `Faulted`.
    FaultContained,
    /// Stop of a unit is being invoked.
    UnitStopping,
    /// Stop of a unit completed.
    UnitStopped,
    /// Stop of a unit failed, panicked or overran the grace period.
    UnitStopFailed,

    // === Policies ===
    /// A retry layer scheduled another attempt. `policy`, `attempt`, `delay_ms` set.
    RetryScheduled,
    /// The fallback timeout aborted a start.
    TimeoutHit,

    // === Liveness ===
    /// Background monitor tick. `elapsed_ms` set.
    MonitorTick,

    // === Subscribers ===
    /// Subscriber panicked during event processing.
    SubscriberPanicked,
    /// Subscriber queue was full or closed; event dropped for it.
    SubscriberOverflow,
}

impl EventKind {
    /// Log level this kind is written at.
    pub fn level(self) -> Level {
        match self {
            EventKind::HostStarting
            | EventKind::HostRunning
            | EventKind::ShutdownRequested
            | EventKind::HostStopped
            | EventKind::UnitStarted
            | EventKind::UnitStopping
            | EventKind::UnitStopped
            | EventKind::MonitorTick => Level::INFO,
            EventKind::UnitStarting => Level::DEBUG,
            EventKind::UnitCanceled
            | EventKind::RetryScheduled
            | EventKind::FaultContained
            | EventKind::GraceExceeded
            | EventKind::SubscriberOverflow => Level::WARN,
            EventKind::UnitFaulted
            | EventKind::ErrorHookFailed
            | EventKind::UnitStopFailed
            | EventKind::TimeoutHit
            | EventKind::SubscriberPanicked => Level::ERROR,
        }
    }

    /// Stable kebab-case label.
    pub fn as_label(self) -> &'static str {
        match self {
            EventKind::HostStarting => "host-starting",
            EventKind::HostRunning => "host-running",
            EventKind::ShutdownRequested => "shutdown-requested",
            EventKind::HostStopped => "host-stopped",
            EventKind::GraceExceeded => "grace-exceeded",
            EventKind::UnitStarting => "unit-starting",
            EventKind::UnitStarted => "unit-started",
            EventKind::UnitCanceled => "unit-canceled",
            EventKind::UnitFaulted => "unit-faulted",
            EventKind::ErrorHookFailed => "error-hook-failed",
            EventKind::FaultContained => "fault-contained",
            EventKind::UnitStopping => "unit-stopping",
            EventKind::UnitStopped => "unit-stopped",
            EventKind::UnitStopFailed => "unit-stop-failed",
            EventKind::RetryScheduled => "retry-scheduled",
            EventKind::TimeoutHit => "timeout-hit",
            EventKind::MonitorTick => "monitor-tick",
            EventKind::SubscriberPanicked => "subscriber-panicked",
            EventKind::SubscriberOverflow => "subscriber-overflow",
        }
    }
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Name of the unit (or subscriber), if applicable.
    pub unit: Option<Arc<str>>,
    /// Human-readable reason (errors, triggers, statuses).
    pub reason: Option<Arc<str>>,
    /// Name of the retry policy that produced the event.
    pub policy: Option<Arc<str>>,
    /// Attempt index (starting from 1).
    pub attempt: Option<u32>,
    /// Delay before the next attempt in milliseconds.
    pub delay_ms: Option<u64>,
    /// Timeout in milliseconds.
    pub timeout_ms: Option<u64>,
    /// Elapsed run time in milliseconds.
    pub elapsed_ms: Option<u64>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            unit: None,
            reason: None,
            policy: None,
            attempt: None,
            delay_ms: None,
            timeout_ms: None,
            elapsed_ms: None,
        }
    }

    /// Attaches a unit name.
    #[inline]
    pub fn with_unit(mut self, unit: impl Into<Arc<str>>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the retry policy name.
    #[inline]
    pub fn with_policy(mut self, policy: impl Into<Arc<str>>) -> Self {
        self.policy = Some(policy.into());
        self
    }

    /// Attaches an attempt index.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(millis(d));
        self
    }

    /// Attaches a timeout (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout_ms = Some(millis(d));
        self
    }

    /// Attaches an elapsed duration (stored as milliseconds).
    #[inline]
    pub fn with_elapsed(mut self, d: Duration) -> Self {
        self.elapsed_ms = Some(millis(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_unit(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_unit(subscriber)
            .with_reason(info)
    }

    /// Writes the event through `tracing` at its kind's level.
    pub fn log(&self) {
        let kind = self.kind.as_label();
        let unit = self.unit.as_deref().unwrap_or("-");
        let reason = self.reason.as_deref().unwrap_or("");
        let level = self.kind.level();
        if level == Level::ERROR {
            tracing::error!(
                event = kind,
                unit,
                attempt = self.attempt,
                timeout_ms = self.timeout_ms,
                "{reason}"
            );
        } else if level == Level::WARN {
            tracing::warn!(
                event = kind,
                unit,
                policy = self.policy.as_deref(),
                attempt = self.attempt,
                delay_ms = self.delay_ms,
                "{reason}"
            );
        } else if level == Level::INFO {
            tracing::info!(event = kind, unit, elapsed_ms = self.elapsed_ms, "{reason}");
        } else {
            tracing::debug!(event = kind, unit, seq = self.seq, "{reason}");
        }
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}
