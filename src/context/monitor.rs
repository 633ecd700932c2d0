//! # Background liveness monitor and run stopwatch.
//!
//! ```text
//! start_monitor(interval)
//!   ├─ stopwatch.start()
//!   ├─ abort previous timer task (re-start replaces, never stacks)
//!   └─ spawn: every `interval`
//!        ├─ elapsed = stopwatch.elapsed()
//!        ├─ on_tick(elapsed)          (panics caught)
//!        └─ emit MonitorTick (info)
//!
//! stop_monitor()
//!   ├─ abort timer task (no-op when none)
//!   └─ stopwatch.stop()
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::events::{Bus, Event, EventKind};

/// Tick callback: receives the elapsed run time.
pub type TickFn = std::sync::Arc<dyn Fn(Duration) + Send + Sync>;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Default)]
struct StopwatchState {
    started: Option<Instant>,
    accumulated: Duration,
}

/// Start/stop stopwatch over tokio's clock.
#[derive(Debug, Default)]
pub struct Stopwatch {
    state: Mutex<StopwatchState>,
}

impl Stopwatch {
    /// Starts (or resumes) measuring; no-op while running.
    pub fn start(&self) {
        let mut st = lock(&self.state);
        if st.started.is_none() {
            st.started = Some(Instant::now());
        }
    }

    /// Halts measuring; no-op while halted.
    pub fn stop(&self) {
        let mut st = lock(&self.state);
        if let Some(started) = st.started.take() {
            st.accumulated += started.elapsed();
        }
    }

    /// Total measured time.
    pub fn elapsed(&self) -> Duration {
        let st = lock(&self.state);
        st.accumulated + st.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Whether the stopwatch is measuring.
    pub fn is_running(&self) -> bool {
        lock(&self.state).started.is_some()
    }
}

/// Recurring timer task; at most one is active.
#[derive(Debug, Default)]
pub(crate) struct Monitor {
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Monitor {
    /// Spawns the tick loop, replacing any running one.
    pub(crate) fn start<F>(&self, interval: Duration, bus: Bus, elapsed: F, on_tick: Option<TickFn>)
    where
        F: Fn() -> Duration + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let elapsed = elapsed();
                if let Some(cb) = &on_tick {
                    let cb = std::panic::AssertUnwindSafe(|| cb(elapsed));
                    if std::panic::catch_unwind(cb).is_err() {
                        tracing::error!(event = "monitor-tick", "tick callback panicked");
                    }
                }
                bus.emit(
                    Event::new(EventKind::MonitorTick)
                        .with_elapsed(elapsed)
                        .with_reason(format!("alive for {elapsed:?}")),
                );
            }
        });
        if let Some(prev) = lock(&self.timer).replace(handle) {
            prev.abort();
        }
    }

    /// Cancels the tick loop; safe to call repeatedly.
    pub(crate) fn stop(&self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
        }
    }

    /// Whether a tick loop is installed.
    pub(crate) fn is_active(&self) -> bool {
        lock(&self.timer).is_some()
    }
}

impl Drop for Monitor {
    fn drop(&mut self) {
        self.stop();
    }
}
