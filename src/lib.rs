//! # hostvisor
//!
//! **Hostvisor** is a process-hosting runtime: it starts a set of hosted
//! units, retries failed starts through composable policies, escalates
//! unrecovered faults to each unit's error hook and drives an orderly,
//! at-most-once shutdown on OS signals, programmatic requests or faults.
//!
//! ## Architecture
//! ```text
//!   ┌────────────┐  ┌────────────┐  ┌────────────┐
//!   │ HostedUnit │  │ HostedUnit │  │ HostedUnit │   (registration order)
//!   └─────┬──────┘  └─────┬──────┘  └─────┬──────┘
//!         ▼               ▼               ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │ Supervisor                                              │
//! │  - EffectivePolicy (fallback timeout / nested retries)  │
//! │  - StatusCell (Starting→Running→Stopping→Stopped|Faulted)│
//! │  - ExecutionContext (SystemInfo, stopwatch, monitor)    │
//! │  - stop latch + stop lock, error lock                   │
//! └──────┬────────────────────────────────────┬─────────────┘
//!        │ emits                              │ disposes
//!        ▼                                    ▼
//! ┌──────────────────────┐              ┌────────────┐
//! │ Bus (broadcast)      │              │ WebSurface │
//! └──────────┬───────────┘              └────────────┘
//!            ▼
//!   subscriber_listener ──► SubscriberSet ──► worker per Subscribe
//! ```
//!
//! ## Run modes
//! - [`Supervisor::run_and_block`]: starts every unit (concurrently by default,
//!   see [`StartMode`]) and resolves after the stop sequence finished;
//! - [`Supervisor::run_once`]: starts units one at a time, then stops.
//!
//! ## Stop sequence
//! Executed at most once, whoever triggers it first:
//! status → cancel token → stop launched units (reverse order, bounded by
//! `grace`) → release keep-alive → dispose web surface → stop monitor →
//! final status.
//!
//! ## Example
//! ```rust,no_run
//! use std::time::Duration;
//! use hostvisor::{HostConfig, RetryPolicy, Supervisor, UnitError, UnitFn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sup = Supervisor::builder(HostConfig::default())
//!         .add_unit(UnitFn::new("migrate", |_ctx, _token| async {
//!             Ok::<(), UnitError>(())
//!         }).arc())
//!         .with_retry(RetryPolicy::on_any_failure().retry(2).wait_constant(Duration::from_secs(1)))
//!         .build()?;
//!
//!     let status = sup.run_once(true).await?;
//!     println!("finished: {status}");
//!     Ok(())
//! }
//! ```

mod config;
mod context;
mod core;
mod error;
mod events;
mod policies;
mod subscribers;
mod units;

pub use config::{HostConfig, StartMode};
pub use context::{ExecutionContext, Stopwatch, SystemInfo, TickFn};
pub use core::{
    HostBuilder, HostStatus, ShutdownSignal, Startup, StatusCell, StopTrigger, Supervisor,
    WebSurface,
};
pub use error::{HostError, UnitError};
pub use events::{Bus, Event, EventKind};
pub use policies::{
    AttemptFn, Backoff, EffectivePolicy, FailurePredicate, Jitter, RetryHook, RetryNotice,
    RetryPolicy, RetryPolicyChain, WaitFn,
};
pub use subscribers::{Subscribe, SubscriberSet};
pub use units::{ErrorArgs, HostedUnit, UnitFn, UnitRef, UnitRegistration, UnitRegistry};
