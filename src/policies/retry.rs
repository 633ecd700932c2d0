//! # Retry policy: one layer of the retry chain.
//!
//! A [`RetryPolicy`] engages only for failures matching its predicate and
//! retries them up to `retry_attempts` *additional* times, waiting
//! `wait(n)` before retry `n` (1-based). Non-matching failures pass through
//! unretried so another layer may handle them.
//!
//! ```text
//! attempt 1 ──► Err(e) ──► matches(e)? ──no──► Err(e)
//!                             │yes
//!                             ├─ retries == retry_attempts ──► Err(e)
//!                             ├─ on_retry(notice), emit RetryScheduled (warn)
//!                             ├─ sleep(wait(n)) (cancellable → Err(Canceled))
//!                             └─ attempt n+1
//! ```
//!
//! ## Rules
//! - [`UnitError::Canceled`] is never matched.
//! - Each layer counts its own retries, independent of sibling layers.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::error::UnitError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::backoff::Backoff;

/// Failure classifier.
pub type FailurePredicate = Arc<dyn Fn(&UnitError) -> bool + Send + Sync>;
/// Wait function; receives the 1-based retry index.
pub type WaitFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;
/// Callback fired on every retry of a layer.
pub type RetryHook = Arc<dyn Fn(&RetryNotice<'_>) + Send + Sync>;

/// Details passed to a [`RetryHook`].
#[derive(Debug)]
pub struct RetryNotice<'a> {
    /// Policy that scheduled the retry.
    pub policy: &'a str,
    /// Unit whose start is retried.
    pub unit: &'a str,
    /// 1-based retry index within this layer.
    pub attempt: u32,
    /// Wait before the retry.
    pub delay: Duration,
    /// Failure that caused the retry.
    pub error: &'a UnitError,
}

/// A named, predicate-matched retry rule. Immutable once added to a chain.
///
/// ## Example
/// ```rust
/// use std::time::Duration;
/// use hostvisor::{RetryPolicy, UnitError};
///
/// let policy = RetryPolicy::handle("db-unavailable", |e: &UnitError| e.is_retryable())
///     .retry(2)
///     .wait_with(|n| Duration::from_millis(100 * u64::from(n)));
///
/// assert_eq!(policy.retry_attempts(), 2);
/// assert_eq!(policy.wait_for(3), Duration::from_millis(300));
/// assert!(!policy.matches(&UnitError::Canceled));
/// ```
#[derive(Clone)]
pub struct RetryPolicy {
    name: Cow<'static, str>,
    predicate: FailurePredicate,
    retry_attempts: u32,
    wait: WaitFn,
    on_retry: Option<RetryHook>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("name", &self.name)
            .field("retry_attempts", &self.retry_attempts)
            .finish_non_exhaustive()
    }
}

impl RetryPolicy {
    /// Default number of additional tries.
    pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;

    /// Policy engaging for failures where `predicate` returns `true`.
    ///
    /// Defaults: 3 retries, constant 1s wait, no callback.
    pub fn handle<P>(name: impl Into<Cow<'static, str>>, predicate: P) -> Self
    where
        P: Fn(&UnitError) -> bool + Send + Sync + 'static,
    {
        let backoff = Backoff::default();
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
            retry_attempts: Self::DEFAULT_RETRY_ATTEMPTS,
            wait: Arc::new(move |n| backoff.delay(n)),
            on_retry: None,
        }
    }

    /// Matches every failure.
    pub fn on_any_failure() -> Self {
        Self::handle("any-failure", |_| true)
    }

    /// Matches transient remote failures ([`UnitError::is_transient`]).
    pub fn on_transient() -> Self {
        Self::handle("transient", UnitError::is_transient)
    }

    /// Matches timeouts.
    pub fn on_timeout() -> Self {
        Self::handle("timeout", |e| matches!(e, UnitError::Timeout { .. }))
    }

    /// Sets the number of additional tries after the first.
    pub fn retry(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    /// Sets the wait function (receives the 1-based retry index).
    pub fn wait_with<W>(mut self, wait: W) -> Self
    where
        W: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.wait = Arc::new(wait);
        self
    }

    /// Waits the same `delay` before every retry.
    pub fn wait_constant(self, delay: Duration) -> Self {
        self.wait_with(move |_| delay)
    }

    /// Waits according to `backoff`.
    pub fn wait_backoff(self, backoff: Backoff) -> Self {
        self.wait_with(move |n| backoff.delay(n))
    }

    /// Sets the callback fired on every retry of this layer.
    pub fn on_retry<H>(mut self, hook: H) -> Self
    where
        H: Fn(&RetryNotice<'_>) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    /// Policy name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of additional tries.
    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// Whether this policy engages for `err`.
    pub fn matches(&self, err: &UnitError) -> bool {
        !err.is_canceled() && (self.predicate)(err)
    }

    /// Wait before the 1-based retry `n`.
    pub fn wait_for(&self, n: u32) -> Duration {
        (self.wait)(n)
    }

    /// Runs `op`, retrying matching failures within this layer's budget.
    pub(crate) async fn execute<'a, F>(
        &'a self,
        unit: &'a str,
        bus: &'a Bus,
        token: &'a CancellationToken,
        mut op: F,
    ) -> Result<(), UnitError>
    where
        F: FnMut() -> BoxFuture<'a, Result<(), UnitError>> + Send,
    {
        let mut retries: u32 = 0;
        loop {
            let err = match op().await {
                Ok(()) => return Ok(()),
                Err(e) => e,
            };
            if !self.matches(&err) || retries >= self.retry_attempts {
                return Err(err);
            }
            retries += 1;
            let delay = self.wait_for(retries);

            if let Some(hook) = &self.on_retry {
                hook(&RetryNotice {
                    policy: &self.name,
                    unit,
                    attempt: retries,
                    delay,
                    error: &err,
                });
            }
            bus.emit(
                Event::new(EventKind::RetryScheduled)
                    .with_unit(unit)
                    .with_policy(self.name.as_ref())
                    .with_attempt(retries)
                    .with_delay(delay)
                    .with_reason(err.to_string()),
            );

            let sleep = time::sleep(delay);
            tokio::pin!(sleep);
            select! {
                _ = &mut sleep => {}
                _ = token.cancelled() => return Err(UnitError::Canceled),
            }
        }
    }
}
