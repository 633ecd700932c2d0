//! # Example: retry_chain
//!
//! Two nested retry layers around a flaky start. The outer layer handles any
//! retryable failure with exponential backoff; the inner one retries only
//! transient failures with a constant short wait.
//!
//! ## Flow
//! ```text
//! outer(on_any_failure, retry 1)
//!   └─► inner(on_transient, retry 2)
//!         └─► start() → 503, 503, 503  (inner gives up)
//!   outer retry #1 → inner → start() → Ok
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example retry_chain
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use hostvisor::{Backoff, HostConfig, Jitter, RetryPolicy, Supervisor, UnitError, UnitFn};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let flaky = UnitFn::new("upstream-sync", move |_ctx, _token| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n <= 3 {
                Err(UnitError::transient(503, format!("upstream busy (call {n})")))
            } else {
                Ok(())
            }
        }
    })
    .arc();

    let outer = RetryPolicy::on_any_failure()
        .retry(1)
        .wait_backoff(
            Backoff::exponential(Duration::from_millis(200), Duration::from_secs(2))
                .with_jitter(Jitter::Equal),
        )
        .on_retry(|n| tracing::info!(attempt = n.attempt, delay = ?n.delay, "outer retry"));
    let inner = RetryPolicy::on_transient()
        .retry(2)
        .wait_constant(Duration::from_millis(50));

    let sup = Supervisor::builder(HostConfig::default())
        .add_unit(flaky)
        .with_retry(outer)
        .with_retry(inner)
        .build()?;

    let status = sup.run_once(true).await?;
    println!("host finished: {status} after {} calls", calls.load(Ordering::SeqCst));
    Ok(())
}
