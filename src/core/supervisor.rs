//! # Supervisor: runs hosted units, escalates faults, drives the stop sequence.
//!
//! The [`Supervisor`] owns the event bus, the [`SubscriberSet`], the shared
//! [`ExecutionContext`], the composed retry policy and the status cell.
//!
//! ## Run modes
//! ```text
//! run_and_block()                          run_once(force_stop)
//!   enter(): listener, monitor, signals      enter()
//!   for unit in registration order:          for unit in registration order:
//!     Concurrent → spawn start_unit            start_unit().await  (retries included)
//!     Sequential → start_unit().await        mark Running
//!   mark Running                             stop_with(RunOnceCompleted)
//!   wait keep-alive, wait terminated         wait terminated
//!   drain outstanding starts (grace)
//! ```
//!
//! ## start_unit
//! ```text
//! claim launch ──► emit UnitStarting ──► EffectivePolicy::execute(unit.start)
//!   ├─ Ok            → emit UnitStarted
//!   ├─ Err(Canceled) → emit UnitCanceled (warn, no escalation)
//!   ├─ Err(_) after the master token was cancelled → UnitCanceled
//!   └─ Err(e)        → escalate(e)
//! ```
//!
//! ## escalate (error lock)
//! ```text
//! mark Faulted ──► emit UnitFaulted ──► lock(error_lock)
//!   ──► args = ErrorArgs{continue_close: force_close}
//!   ──► unit.error(&e, &mut args)      (errors/panics logged, swallowed)
//!   ──► unlock ──► continue_close ? stop_with(Fault) : emit FaultContained
//! ```
//!
//! ## stop_with (latch + stop lock)
//! ```text
//! latch already set? → return false
//! 1. Starting|Running → Stopping (unless faulted)
//! 2. cancel master token
//! 3. stop launched units, reverse registration order (each bounded by grace)
//! 4. release keep-alive
//! 5. dispose web surface
//! 6. stop monitor
//! 7. Stopped | Faulted, emit HostStopped, signal terminated
//! ```
//! Every step is independent; a failing unit stop is logged and the loop goes on.
//! The error lock and the stop lock are distinct, so an error hook running
//! under the error lock can always schedule a stop.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::{HostConfig, StartMode};
use crate::context::ExecutionContext;
use crate::core::builder::HostBuilder;
use crate::core::shutdown::{self, ShutdownSignal};
use crate::core::status::{HostStatus, StatusCell};
use crate::core::surface::WebSurface;
use crate::error::{HostError, UnitError};
use crate::events::{Bus, Event, EventKind};
use crate::policies::EffectivePolicy;
use crate::subscribers::SubscriberSet;
use crate::units::{ErrorArgs, UnitRef, UnitRegistration};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What initiated the stop sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StopTrigger {
    /// OS signal or console interrupt.
    Signal(ShutdownSignal),
    /// [`Supervisor::stop`].
    Programmatic,
    /// `run_once` finished dispatching every start.
    RunOnceCompleted,
    /// A unit fault escalated with `continue_close = true`.
    Fault {
        /// Faulted unit.
        unit: String,
    },
}

impl std::fmt::Display for StopTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopTrigger::Signal(sig) => write!(f, "signal: {}", sig.as_label()),
            StopTrigger::Programmatic => f.write_str("programmatic stop"),
            StopTrigger::RunOnceCompleted => f.write_str("run-once completed"),
            StopTrigger::Fault { unit } => write!(f, "fault in unit {unit}"),
        }
    }
}

/// Registration plus its launch flag.
struct Slot {
    registration: UnitRegistration,
    launched: AtomicBool,
}

/// Parameters assembled by [`HostBuilder`].
pub(crate) struct SupervisorParts {
    pub(crate) cfg: HostConfig,
    pub(crate) units: Vec<UnitRegistration>,
    pub(crate) policy: EffectivePolicy,
    pub(crate) ctx: Arc<ExecutionContext>,
    pub(crate) bus: Bus,
    pub(crate) subs: SubscriberSet,
    pub(crate) defer_to_triggers: bool,
}

/// Coordinates hosted units, fault escalation and the stop sequence.
pub struct Supervisor {
    cfg: HostConfig,
    slots: Vec<Slot>,
    policy: EffectivePolicy,
    ctx: Arc<ExecutionContext>,
    status: StatusCell,
    bus: Bus,
    subs: Mutex<Option<SubscriberSet>>,
    web: Mutex<Option<Arc<dyn WebSurface>>>,
    defer_to_triggers: bool,

    /// Master cancellation source shared by every unit.
    token: CancellationToken,
    keep_alive: CancellationToken,
    terminated: CancellationToken,

    run_latch: AtomicBool,
    force_close: AtomicBool,
    stop_latch: AtomicBool,
    stop_lock: AsyncMutex<()>,
    error_lock: AsyncMutex<()>,
    starts: Mutex<JoinSet<()>>,
}

impl Supervisor {
    /// Returns a builder for the given configuration.
    pub fn builder(cfg: HostConfig) -> HostBuilder {
        HostBuilder::new(cfg)
    }

    pub(crate) fn new_internal(parts: SupervisorParts) -> Self {
        let slots = parts
            .units
            .into_iter()
            .map(|registration| Slot {
                registration,
                launched: AtomicBool::new(false),
            })
            .collect();
        Self {
            cfg: parts.cfg,
            slots,
            policy: parts.policy,
            ctx: parts.ctx,
            status: StatusCell::default(),
            bus: parts.bus,
            subs: Mutex::new(Some(parts.subs)),
            web: Mutex::new(None),
            defer_to_triggers: parts.defer_to_triggers,
            token: CancellationToken::new(),
            keep_alive: CancellationToken::new(),
            terminated: CancellationToken::new(),
            run_latch: AtomicBool::new(false),
            force_close: AtomicBool::new(true),
            stop_latch: AtomicBool::new(false),
            stop_lock: AsyncMutex::new(()),
            error_lock: AsyncMutex::new(()),
            starts: Mutex::new(JoinSet::new()),
        }
    }

    // ---- Read-only surface ----

    /// Displayed status; polled by liveness probes.
    pub fn status(&self) -> HostStatus {
        self.status.get()
    }

    /// `true` until any unit faults.
    pub fn is_healthy(&self) -> bool {
        !self.status.ever_faulted()
    }

    /// Whether any unit ever faulted during this run.
    pub fn ever_faulted(&self) -> bool {
        self.status.ever_faulted()
    }

    /// Whether the stop sequence finished.
    pub fn is_terminated(&self) -> bool {
        self.status.terminated()
    }

    /// Shared execution context.
    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.ctx
    }

    /// Effective configuration.
    pub fn config(&self) -> &HostConfig {
        &self.cfg
    }

    /// Registered unit names in registration order.
    pub fn unit_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.registration.name()).collect()
    }

    /// Raw event stream (events sent after this call).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Attaches the auxiliary surface disposed during the stop sequence.
    ///
    /// Replaces a previously attached surface.
    pub fn attach_web_surface(&self, surface: Arc<dyn WebSurface>) {
        *lock(&self.web) = Some(surface);
    }

    // ---- Run entry points ----

    /// Starts every unit and resolves once the stop sequence has finished.
    ///
    /// Returns the final displayed status (`Stopped`, or `Faulted` when any
    /// unit faulted).
    pub async fn run_and_block(self: &Arc<Self>) -> Result<HostStatus, HostError> {
        self.enter(true, true)?;

        if !self.defer_to_triggers {
            for idx in 0..self.slots.len() {
                match self.cfg.start_mode {
                    StartMode::Concurrent => {
                        if !self.claim_launch(idx).await {
                            break;
                        }
                        let me = Arc::clone(self);
                        lock(&self.starts).spawn(async move { me.start_unit(idx, true).await });
                    }
                    StartMode::Sequential => {
                        if !self.claim_launch(idx).await {
                            break;
                        }
                        self.start_unit(idx, true).await;
                    }
                }
            }
        }
        if self.status.mark_running() {
            self.bus.emit(Event::new(EventKind::HostRunning).with_reason("all starts dispatched"));
        }

        self.keep_alive.cancelled().await;
        self.terminated.cancelled().await;
        self.drain_starts().await;
        Ok(self.status())
    }

    /// Starts every unit one at a time (retries included), then stops.
    ///
    /// `force_stop` is the default of [`ErrorArgs::continue_close`] handed to
    /// a faulted unit's error hook.
    pub async fn run_once(self: &Arc<Self>, force_stop: bool) -> Result<HostStatus, HostError> {
        self.enter(false, force_stop)?;

        if !self.defer_to_triggers {
            for idx in 0..self.slots.len() {
                if !self.claim_launch(idx).await {
                    break;
                }
                self.start_unit(idx, force_stop).await;
            }
        }
        if self.status.mark_running() {
            self.bus.emit(Event::new(EventKind::HostRunning).with_reason("all starts completed"));
        }

        self.stop_with(StopTrigger::RunOnceCompleted).await;
        self.terminated.cancelled().await;
        self.drain_starts().await;
        Ok(self.status())
    }

    /// Requests the stop sequence.
    ///
    /// Returns `true` if this call executed it, `false` if another trigger
    /// already did (or is doing so). Never waits for a sequence run by
    /// someone else; use [`wait_stopped`](Self::wait_stopped) for that.
    pub async fn stop(&self) -> bool {
        self.stop_with(StopTrigger::Programmatic).await
    }

    /// Resolves once the stop sequence has finished.
    pub async fn wait_stopped(&self) {
        self.terminated.cancelled().await;
    }

    /// Starts a registered unit on demand (deferred mode only).
    ///
    /// Returns once the start is dispatched; its outcome goes through the
    /// usual retry and fault paths.
    pub async fn trigger(self: &Arc<Self>, name: &str) -> Result<(), HostError> {
        let reject = |reason| HostError::TriggerRejected {
            name: name.to_string(),
            reason,
        };
        if !self.slots.iter().any(|s| s.registration.name() == name) {
            return Err(HostError::UnknownUnit {
                name: name.to_string(),
            });
        }
        if !self.defer_to_triggers {
            return Err(reject("host starts units itself"));
        }
        if !self.run_latch.load(Ordering::Acquire) {
            return Err(reject("host is not running"));
        }
        let idx = self.claim_trigger(name).await.map_err(reject)?;

        let force_close = self.force_close.load(Ordering::Acquire);
        let me = Arc::clone(self);
        lock(&self.starts).spawn(async move { me.start_unit(idx, force_close).await });
        Ok(())
    }

    // ---- Internals ----

    fn enter(self: &Arc<Self>, continuous: bool, force_close: bool) -> Result<(), HostError> {
        if self.run_latch.swap(true, Ordering::AcqRel) {
            return Err(HostError::AlreadyRunning);
        }
        self.force_close.store(force_close, Ordering::Release);
        self.ctx.set_continuously_running(continuous);
        self.subscriber_listener();
        self.bus.emit(
            Event::new(EventKind::HostStarting).with_reason(if continuous {
                "run-and-block"
            } else {
                "run-once"
            }),
        );
        self.ctx.start_monitor(&self.bus);
        self.spawn_signal_listener();
        Ok(())
    }

    /// Forwards bus events to the subscriber set until the host has stopped.
    fn subscriber_listener(&self) {
        let Some(set) = lock(&self.subs).take() else {
            return;
        };
        if set.is_empty() {
            return;
        }
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => {
                        set.emit(&ev);
                        if ev.kind == EventKind::HostStopped {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            set.shutdown().await;
        });
    }

    fn spawn_signal_listener(self: &Arc<Self>) {
        if !self.cfg.handle_signals {
            return;
        }
        let me = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                res = shutdown::wait_for_shutdown_signal() => match res {
                    Ok(sig) => {
                        me.stop_with(StopTrigger::Signal(sig)).await;
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "signal handlers unavailable; stop must be requested programmatically"
                        );
                    }
                },
                _ = me.token.cancelled() => {}
            }
        });
    }

    /// Marks a unit as launched unless the stop sequence has begun.
    ///
    /// Serialized with `stop_with` through the stop lock so a unit is either
    /// launched before the stop loop reads the flags or not launched at all.
    async fn claim_launch(&self, idx: usize) -> bool {
        let _guard = self.stop_lock.lock().await;
        if self.stop_latch.load(Ordering::Acquire) {
            return false;
        }
        self.slots[idx].launched.store(true, Ordering::Release);
        true
    }

    /// Claims the first not yet launched registration named `name`.
    ///
    /// Duplicate registrations are launched one per trigger, in registration
    /// order.
    async fn claim_trigger(&self, name: &str) -> Result<usize, &'static str> {
        let _guard = self.stop_lock.lock().await;
        if self.stop_latch.load(Ordering::Acquire) {
            return Err("host is stopping");
        }
        let idx = self
            .slots
            .iter()
            .position(|s| s.registration.name() == name && !s.launched.load(Ordering::Acquire))
            .ok_or("every registration with this name already started")?;
        self.slots[idx].launched.store(true, Ordering::Release);
        Ok(idx)
    }

    async fn start_unit(self: &Arc<Self>, idx: usize, force_close: bool) {
        let registration = &self.slots[idx].registration;
        let name = registration.name();
        self.bus.emit(Event::new(EventKind::UnitStarting).with_unit(name));

        let unit = match registration.resolve() {
            Ok(unit) => unit,
            Err(e) => {
                if !self.status.mark_faulted() {
                    return;
                }
                self.bus.emit(
                    Event::new(EventKind::UnitFaulted)
                        .with_unit(name)
                        .with_reason(format!("unit could not be constructed: {e}")),
                );
                if force_close {
                    self.stop_with(StopTrigger::Fault {
                        unit: name.to_string(),
                    })
                    .await;
                }
                return;
            }
        };

        let ctx = Arc::clone(&self.ctx);
        let target = Arc::clone(&unit);
        let attempt = move |token: CancellationToken| -> BoxFuture<'static, Result<(), UnitError>> {
            let unit = Arc::clone(&target);
            let ctx = Arc::clone(&ctx);
            async move {
                AssertUnwindSafe(unit.start(ctx, token))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| Err(UnitError::from_panic(payload)))
            }
            .boxed()
        };

        match self.policy.execute(name, &self.bus, &self.token, &attempt).await {
            Ok(()) => {
                self.bus.emit(Event::new(EventKind::UnitStarted).with_unit(name));
            }
            Err(UnitError::Canceled) => {
                self.bus.emit(
                    Event::new(EventKind::UnitCanceled)
                        .with_unit(name)
                        .with_reason("start cancelled"),
                );
            }
            // Failures observed after the host began stopping are not faults.
            Err(err) if self.token.is_cancelled() => {
                self.bus.emit(
                    Event::new(EventKind::UnitCanceled)
                        .with_unit(name)
                        .with_reason(format!("start ended during shutdown: {err}")),
                );
            }
            Err(err) => self.escalate(&unit, name, err, force_close).await,
        }
    }

    async fn escalate(&self, unit: &UnitRef, name: &str, err: UnitError, force_close: bool) {
        if !self.status.mark_faulted() {
            tracing::debug!(
                unit = name,
                error = %err,
                "fault reported after the host stopped; ignored"
            );
            return;
        }
        self.bus.emit(
            Event::new(EventKind::UnitFaulted)
                .with_unit(name)
                .with_reason(format!("{} ({})", err, err.as_label())),
        );

        let continue_close = {
            let _guard = self.error_lock.lock().await;
            let mut args = ErrorArgs::new(force_close);
            let hook = std::panic::catch_unwind(AssertUnwindSafe(|| unit.error(&err, &mut args)));
            let hook_failure = match hook {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(payload) => Some(UnitError::from_panic(payload)),
            };
            if let Some(e) = hook_failure {
                self.bus.emit(
                    Event::new(EventKind::ErrorHookFailed)
                        .with_unit(name)
                        .with_reason(e.to_string()),
                );
            }
            args.continue_close
        };

        if continue_close {
            self.stop_with(StopTrigger::Fault {
                unit: name.to_string(),
            })
            .await;
        } else {
            self.bus.emit(
                Event::new(EventKind::FaultContained)
                    .with_unit(name)
                    .with_reason("error hook kept the host running"),
            );
        }
    }

    /// Runs the stop sequence at most once.
    async fn stop_with(&self, trigger: StopTrigger) -> bool {
        if self.stop_latch.swap(true, Ordering::AcqRel) {
            tracing::debug!(%trigger, "stop sequence already executed or in progress");
            return false;
        }
        let _guard = self.stop_lock.lock().await;

        // 1
        self.status.begin_stopping();
        // 2
        self.bus.emit(
            Event::new(EventKind::ShutdownRequested).with_reason(trigger.to_string()),
        );
        self.token.cancel();
        // 3
        for slot in self.slots.iter().rev() {
            if slot.launched.load(Ordering::Acquire) {
                self.stop_unit(&slot.registration).await;
            }
        }
        // 4
        self.keep_alive.cancel();
        // 5
        let web = lock(&self.web).take();
        if let Some(web) = web {
            if AssertUnwindSafe(web.dispose()).catch_unwind().await.is_err() {
                tracing::error!(surface = web.name(), "web surface panicked while disposing");
            }
        }
        // 6
        self.ctx.stop_monitor();
        // 7
        let status = self.status.finish();
        self.bus.emit(
            Event::new(EventKind::HostStopped)
                .with_elapsed(self.ctx.elapsed())
                .with_reason(status.as_label()),
        );
        self.terminated.cancel();
        true
    }

    async fn stop_unit(&self, registration: &UnitRegistration) {
        let name = registration.name();
        let unit = match registration.resolve() {
            Ok(unit) => unit,
            Err(e) => {
                self.bus.emit(
                    Event::new(EventKind::UnitStopFailed)
                        .with_unit(name)
                        .with_reason(e.to_string()),
                );
                return;
            }
        };

        self.bus.emit(Event::new(EventKind::UnitStopping).with_unit(name));
        let grace = self.cfg.grace;
        let stopped = time::timeout(grace, AssertUnwindSafe(unit.stop()).catch_unwind()).await;
        let failure = match stopped {
            Ok(Ok(Ok(()))) => None,
            Ok(Ok(Err(e))) => Some(e),
            Ok(Err(payload)) => Some(UnitError::from_panic(payload)),
            Err(_elapsed) => Some(UnitError::Timeout { timeout: grace }),
        };
        match failure {
            None => self.bus.emit(Event::new(EventKind::UnitStopped).with_unit(name)),
            Some(e) => self.bus.emit(
                Event::new(EventKind::UnitStopFailed)
                    .with_unit(name)
                    .with_reason(e.to_string()),
            ),
        }
    }

    /// Waits for spawned starts after shutdown; aborts them after `grace`.
    async fn drain_starts(&self) {
        let mut set = std::mem::take(&mut *lock(&self.starts));
        let grace = self.cfg.grace;
        let drained = time::timeout(grace, async {
            while set.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            self.bus.emit(
                Event::new(EventKind::GraceExceeded)
                    .with_timeout(grace)
                    .with_reason(format!("{} start(s) still running; aborted", set.len())),
            );
            set.abort_all();
        }
    }
}
