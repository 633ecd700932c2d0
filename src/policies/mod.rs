//! Retry policies applied around unit starts.
//!
//! ## Contents
//! - [`RetryPolicy`] one predicate-matched layer (budget, wait function, callback)
//! - [`RetryPolicyChain`] ordered layers, folded by `build_effective`
//! - [`EffectivePolicy`] the composed callable (fallback timeout / single / nested)
//! - [`Backoff`], [`Jitter`] ready-made wait functions
//!
//! ## Quick wiring
//! ```text
//! HostBuilder::with_retry(policy) ──► RetryPolicyChain
//!      └─► Supervisor holds chain.build_effective()
//!           └─► every unit start runs inside EffectivePolicy::execute
//! ```

mod backoff;
mod chain;
mod retry;

pub use backoff::{Backoff, Jitter};
pub use chain::{AttemptFn, EffectivePolicy, RetryPolicyChain};
pub use retry::{FailurePredicate, RetryHook, RetryNotice, RetryPolicy, WaitFn};
