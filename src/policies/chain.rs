//! # Retry chain: composing policies into one effective policy.
//!
//! [`RetryPolicyChain`] collects [`RetryPolicy`] layers in order and
//! [`RetryPolicyChain::build_effective`] folds them into an [`EffectivePolicy`]:
//!
//! ```text
//! 0 policies ──► Timeout(fallback)     start aborted after `fallback` (default 60s)
//! 1 policy   ──► Single(p)
//! N policies ──► Nested([p0, p1, .., pN-1])
//!
//!   p0.execute(                         outermost: sees failures only after
//!     p1.execute(                       every inner layer gave up
//!       ...
//!         pN-1.execute(op(child_token))))
//! ```
//!
//! Every attempt of the wrapped operation gets a fresh child of the host's
//! cancellation token, so a timed-out attempt can be cancelled without
//! touching the host.

use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::error::UnitError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::retry::RetryPolicy;

/// Operation wrapped by an [`EffectivePolicy`]; called once per attempt.
pub type AttemptFn =
    dyn Fn(CancellationToken) -> BoxFuture<'static, Result<(), UnitError>> + Send + Sync;

/// Ordered list of retry policies.
#[derive(Clone, Debug)]
pub struct RetryPolicyChain {
    policies: Vec<RetryPolicy>,
    fallback_timeout: Duration,
}

impl Default for RetryPolicyChain {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicyChain {
    /// Ceiling applied to a start when no policy is configured.
    pub const DEFAULT_FALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

    /// Empty chain with the default fallback timeout.
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
            fallback_timeout: Self::DEFAULT_FALLBACK_TIMEOUT,
        }
    }

    /// Appends a policy; the first added is the outermost layer.
    pub fn add(&mut self, policy: RetryPolicy) -> &mut Self {
        self.policies.push(policy);
        self
    }

    /// Owned variant of [`add`](Self::add).
    pub fn with(mut self, policy: RetryPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    /// Overrides the zero-policy fallback timeout.
    pub fn with_fallback_timeout(mut self, timeout: Duration) -> Self {
        self.fallback_timeout = timeout;
        self
    }

    /// Current fallback timeout.
    pub fn fallback_timeout(&self) -> Duration {
        self.fallback_timeout
    }

    /// Number of configured policies.
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether no policy is configured.
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Folds the chain into a single callable policy.
    pub fn build_effective(&self) -> EffectivePolicy {
        match self.policies.as_slice() {
            [] => EffectivePolicy::Timeout(self.fallback_timeout),
            [single] => EffectivePolicy::Single(single.clone()),
            many => EffectivePolicy::Nested(many.to_vec()),
        }
    }
}

/// The composed policy applied around every unit start.
#[derive(Clone, Debug)]
pub enum EffectivePolicy {
    /// No policy configured: abort the start after the given duration.
    Timeout(Duration),
    /// Exactly one policy.
    Single(RetryPolicy),
    /// Nested layers, index 0 outermost.
    Nested(Vec<RetryPolicy>),
}

impl EffectivePolicy {
    /// Runs `op` under this policy on behalf of `unit`.
    pub async fn execute(
        &self,
        unit: &str,
        bus: &Bus,
        token: &CancellationToken,
        op: &AttemptFn,
    ) -> Result<(), UnitError> {
        match self {
            EffectivePolicy::Timeout(limit) => run_with_timeout(*limit, unit, bus, token, op).await,
            EffectivePolicy::Single(policy) => {
                run_layers(std::slice::from_ref(policy), unit, bus, token, op).await
            }
            EffectivePolicy::Nested(policies) => run_layers(policies, unit, bus, token, op).await,
        }
    }
}

async fn run_with_timeout(
    limit: Duration,
    unit: &str,
    bus: &Bus,
    token: &CancellationToken,
    op: &AttemptFn,
) -> Result<(), UnitError> {
    let child = token.child_token();
    match time::timeout(limit, op(child.clone())).await {
        Ok(res) => res,
        Err(_elapsed) => {
            child.cancel();
            bus.emit(
                Event::new(EventKind::TimeoutHit)
                    .with_unit(unit)
                    .with_timeout(limit)
                    .with_reason("start did not complete before the fallback timeout"),
            );
            Err(UnitError::Timeout { timeout: limit })
        }
    }
}

fn run_layers<'a>(
    layers: &'a [RetryPolicy],
    unit: &'a str,
    bus: &'a Bus,
    token: &'a CancellationToken,
    op: &'a AttemptFn,
) -> BoxFuture<'a, Result<(), UnitError>> {
    match layers.split_first() {
        None => op(token.child_token()),
        Some((outer, inner)) => outer
            .execute(unit, bus, token, move || run_layers(inner, unit, bus, token, op))
            .boxed(),
    }
}
