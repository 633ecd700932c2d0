//! # Example: run_once
//!
//! Batch-style hosting: three units start one after another, then the host
//! stops them in reverse order and exits.
//!
//! ## Flow
//! ```text
//! run_once(force_stop = true)
//!   ├─► start(fetch) ─► start(transform) ─► start(publish)
//!   └─► stop(publish) ─► stop(transform) ─► stop(fetch) ─► Stopped
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=debug cargo run --example run_once
//! ```

use std::time::Duration;

use hostvisor::{HostConfig, Supervisor, UnitError, UnitFn, UnitRef};
use tracing_subscriber::EnvFilter;

fn step(name: &'static str, work: Duration) -> UnitRef {
    UnitFn::new(name, move |ctx, _token| async move {
        tokio::time::sleep(work).await;
        tracing::info!(unit = name, elapsed = ?ctx.elapsed(), "step done");
        Ok::<(), UnitError>(())
    })
    .with_stop(move || async move {
        tracing::info!(unit = name, "releasing resources");
        Ok(())
    })
    .arc()
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = HostConfig {
        environment: "demo".into(),
        ..HostConfig::default()
    };
    let sup = Supervisor::builder(cfg)
        .add_unit(step("fetch", Duration::from_millis(200)))
        .add_unit(step("transform", Duration::from_millis(100)))
        .add_unit(step("publish", Duration::from_millis(50)))
        .build()?;

    let status = sup.run_once(true).await?;
    println!("host finished: {status}");
    Ok(())
}
