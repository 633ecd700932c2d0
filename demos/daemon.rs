//! # Example: daemon
//!
//! Long-running hosting: a worker spawns its loop from `start` and exits when
//! the host token is cancelled. An optional unit faults, but its error hook
//! vetoes shutdown. Press Ctrl-C (or wait 5s) to stop.
//!
//! ## Run
//! ```bash
//! cargo run --example daemon
//! ```

use std::sync::Arc;
use std::time::Duration;

use hostvisor::{HostConfig, Supervisor, UnitError, UnitFn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let worker = UnitFn::new("worker", |ctx, token| async move {
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_millis(500));
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => tracing::info!(elapsed = ?ctx.elapsed(), "working"),
                }
            }
        });
        Ok::<(), UnitError>(())
    })
    .arc();

    let optional = UnitFn::new("metrics-push", |_ctx, _token| async {
        Err(UnitError::transient(503, "collector unavailable"))
    })
    .with_error(|err, args| {
        tracing::warn!(error = %err, "metrics disabled for this run");
        args.continue_close = false;
        Ok(())
    })
    .arc();

    let cfg = HostConfig {
        monitor_interval: Duration::from_secs(1),
        ..HostConfig::default()
    };
    let sup = Supervisor::builder(cfg)
        .add_unit(worker)
        .add_unit(optional)
        .with_tick(Arc::new(|elapsed| tracing::debug!(?elapsed, "monitor tick")))
        .build()?;

    let stopper = Arc::clone(&sup);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        stopper.stop().await;
    });

    let status = sup.run_and_block().await?;
    println!("host finished: {status} (healthy: {})", sup.is_healthy());
    Ok(())
}
