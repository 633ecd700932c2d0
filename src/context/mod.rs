//! # Shared execution context handed to every hosted unit.
//!
//! [`ExecutionContext`] is created once per [`Supervisor`](crate::Supervisor)
//! and shared as `Arc<ExecutionContext>`. Units read it; only the supervisor's
//! run/stop paths and the monitor timer mutate it.
//!
//! ## Contents
//! - [`SystemInfo`] machine/process snapshot
//! - [`Stopwatch`] elapsed run time
//! - the background monitor (interval ticks, optional [`TickFn`] callback)

mod monitor;
mod system;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::events::Bus;

pub use monitor::{Stopwatch, TickFn};
pub use system::SystemInfo;

use monitor::Monitor;

/// Read-mostly data shared by all hosted units of one host.
pub struct ExecutionContext {
    monitor_interval: Option<Duration>,
    continuously_running: AtomicBool,
    stopwatch: Stopwatch,
    system_info: SystemInfo,
    on_tick: Option<TickFn>,
    monitor: Monitor,
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("monitor_interval", &self.monitor_interval)
            .field("continuously_running", &self.is_continuously_running())
            .field("elapsed", &self.elapsed())
            .field("system_info", &self.system_info)
            .finish_non_exhaustive()
    }
}

impl ExecutionContext {
    /// Creates a context; a zero `monitor_interval` disables the monitor.
    pub fn new(
        monitor_interval: Option<Duration>,
        system_info: SystemInfo,
        on_tick: Option<TickFn>,
    ) -> Self {
        Self {
            monitor_interval: monitor_interval.filter(|d| !d.is_zero()),
            continuously_running: AtomicBool::new(false),
            stopwatch: Stopwatch::default(),
            system_info,
            on_tick,
            monitor: Monitor::default(),
        }
    }

    /// Monitor interval, `None` when disabled.
    pub fn monitor_interval(&self) -> Option<Duration> {
        self.monitor_interval
    }

    /// `true` in `run_and_block` mode, `false` in `run_once` mode.
    pub fn is_continuously_running(&self) -> bool {
        self.continuously_running.load(Ordering::Acquire)
    }

    /// Time measured since the run started, excluding halted periods.
    pub fn elapsed(&self) -> Duration {
        self.stopwatch.elapsed()
    }

    /// Machine/process snapshot.
    pub fn system_info(&self) -> &SystemInfo {
        &self.system_info
    }

    /// Whether a monitor timer is currently installed.
    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_active()
    }

    pub(crate) fn set_continuously_running(&self, value: bool) {
        self.continuously_running.store(value, Ordering::Release);
    }

    /// Starts the stopwatch and, if an interval is configured, the tick timer.
    ///
    /// Re-invoking replaces the running timer.
    pub fn start_monitor(self: &Arc<Self>, bus: &Bus) {
        self.stopwatch.start();
        let Some(interval) = self.monitor_interval else {
            return;
        };
        let weak = Arc::downgrade(self);
        self.monitor.start(
            interval,
            bus.clone(),
            move || weak.upgrade().map(|c| c.elapsed()).unwrap_or_default(),
            self.on_tick.clone(),
        );
    }

    /// Cancels the tick timer and halts the stopwatch; safe to call repeatedly.
    pub fn stop_monitor(&self) {
        self.monitor.stop();
        self.stopwatch.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio::time;

    fn ctx(interval: Option<Duration>, on_tick: Option<TickFn>) -> Arc<ExecutionContext> {
        Arc::new(ExecutionContext::new(
            interval,
            SystemInfo::capture("test"),
            on_tick,
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_report_elapsed_and_stop_halts_them() {
        let seen = Arc::new(Mutex::new(Vec::<Duration>::new()));
        let sink = seen.clone();
        let cb: TickFn = Arc::new(move |d| sink.lock().unwrap().push(d));
        let ctx = ctx(Some(Duration::from_secs(3)), Some(cb));
        let bus = Bus::new(16);

        ctx.start_monitor(&bus);
        assert!(ctx.is_monitoring());
        time::sleep(Duration::from_millis(3_100)).await;

        let ticks = seen.lock().unwrap().clone();
        assert!(!ticks.is_empty());
        assert!(ticks[0] > Duration::ZERO);

        ctx.stop_monitor();
        ctx.stop_monitor();
        assert!(!ctx.is_monitoring());
        let frozen = ctx.elapsed();
        let count = seen.lock().unwrap().len();

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(seen.lock().unwrap().len(), count);
        assert_eq!(ctx.elapsed(), frozen);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_timer_instead_of_stacking() {
        let seen = Arc::new(Mutex::new(0u32));
        let sink = seen.clone();
        let cb: TickFn = Arc::new(move |_| *sink.lock().unwrap() += 1);
        let ctx = ctx(Some(Duration::from_secs(1)), Some(cb));
        let bus = Bus::new(16);

        ctx.start_monitor(&bus);
        ctx.start_monitor(&bus);
        ctx.start_monitor(&bus);
        time::sleep(Duration::from_millis(1_500)).await;

        assert_eq!(*seen.lock().unwrap(), 1);
        ctx.stop_monitor();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_disables_timer_but_not_stopwatch() {
        let ctx = ctx(Some(Duration::ZERO), None);
        assert_eq!(ctx.monitor_interval(), None);

        ctx.start_monitor(&Bus::new(4));
        assert!(!ctx.is_monitoring());
        time::sleep(Duration::from_secs(2)).await;
        assert!(ctx.elapsed() >= Duration::from_secs(2));
    }
}
