use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast::Receiver;
use tokio_util::sync::CancellationToken;

use hostvisor::{
    ErrorArgs, Event, EventKind, ExecutionContext, HostConfig, HostError, HostStatus, HostedUnit,
    RetryPolicy, StartMode, Subscribe, Supervisor, UnitError, UnitFn, WebSurface,
};

type Log = Arc<Mutex<Vec<String>>>;

#[derive(Clone, Copy)]
enum Behavior {
    Succeed,
    Fail,
    Fatal,
    Hang,
    Panic,
    Sleep(Duration),
    SleepThenFail(Duration),
}

struct Probe {
    name: &'static str,
    behavior: Behavior,
    veto: bool,
    stop_delay: Option<Duration>,
    starts: AtomicU32,
    stops: AtomicU32,
    log: Log,
}

impl Probe {
    fn new(name: &'static str, behavior: Behavior, log: &Log) -> Self {
        Self {
            name,
            behavior,
            veto: false,
            stop_delay: None,
            starts: AtomicU32::new(0),
            stops: AtomicU32::new(0),
            log: Arc::clone(log),
        }
    }

    fn vetoing(mut self) -> Self {
        self.veto = true;
        self
    }

    fn slow_stop(mut self, d: Duration) -> Self {
        self.stop_delay = Some(d);
        self
    }

    fn record(&self, what: impl Into<String>) {
        self.log.lock().unwrap().push(what.into());
    }
}

#[async_trait]
impl HostedUnit for Probe {
    fn name(&self) -> &str {
        self.name
    }

    async fn start(
        &self,
        _ctx: Arc<ExecutionContext>,
        _token: CancellationToken,
    ) -> Result<(), UnitError> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.record(format!("start:{}", self.name));
        match self.behavior {
            Behavior::Succeed => Ok(()),
            Behavior::Fail => Err(UnitError::fail("boom")),
            Behavior::Fatal => Err(UnitError::fatal("broken")),
            Behavior::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
            Behavior::Panic => panic!("start exploded"),
            Behavior::Sleep(d) => {
                tokio::time::sleep(d).await;
                self.record(format!("ready:{}", self.name));
                Ok(())
            }
            Behavior::SleepThenFail(d) => {
                tokio::time::sleep(d).await;
                Err(UnitError::fail("late failure"))
            }
        }
    }

    async fn stop(&self) -> Result<(), UnitError> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.stop_delay {
            tokio::time::sleep(d).await;
        }
        self.record(format!("stop:{}", self.name));
        Ok(())
    }

    fn error(&self, err: &UnitError, args: &mut ErrorArgs) -> Result<(), UnitError> {
        self.record(format!("error:{}:{}", self.name, err.as_label()));
        if self.veto {
            args.continue_close = false;
        }
        Ok(())
    }
}

fn quiet() -> HostConfig {
    HostConfig {
        handle_signals: false,
        ..HostConfig::default()
    }
}

fn sleepy(name: &'static str, millis: u64, log: &Log) -> Arc<Probe> {
    Arc::new(Probe::new(name, Behavior::Sleep(Duration::from_millis(millis)), log))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

async fn wait_for(rx: &mut Receiver<Event>, kind: EventKind) -> Event {
    loop {
        match rx.recv().await {
            Ok(ev) if ev.kind == kind => return ev,
            Ok(_) => {}
            Err(e) => panic!("bus closed while waiting for {kind:?}: {e}"),
        }
    }
}

#[tokio::test]
async fn run_once_starts_in_order_and_stops_in_reverse() {
    let log = Log::default();
    let sup = Supervisor::builder(quiet())
        .add_unit(Arc::new(Probe::new("a", Behavior::Succeed, &log)))
        .add_unit(Arc::new(Probe::new("b", Behavior::Succeed, &log)))
        .add_unit(Arc::new(Probe::new("c", Behavior::Succeed, &log)))
        .build()
        .unwrap();

    let status = sup.run_once(true).await.unwrap();

    assert_eq!(status, HostStatus::Stopped);
    assert!(sup.is_terminated());
    assert!(sup.is_healthy());
    assert_eq!(
        entries(&log),
        vec!["start:a", "start:b", "start:c", "stop:c", "stop:b", "stop:a"]
    );
}

#[tokio::test]
async fn fault_stops_only_launched_units() {
    let log = Log::default();
    let sup = Supervisor::builder(quiet())
        .add_unit(Arc::new(Probe::new("a", Behavior::Fatal, &log)))
        .add_unit(Arc::new(Probe::new("b", Behavior::Succeed, &log)))
        .add_unit(Arc::new(Probe::new("c", Behavior::Succeed, &log)))
        .build()
        .unwrap();

    let status = sup.run_once(true).await.unwrap();

    assert_eq!(status, HostStatus::Faulted);
    assert!(!sup.is_healthy());
    assert_eq!(
        entries(&log),
        vec!["start:a", "error:a:unit_fatal", "stop:a"]
    );
}

#[tokio::test(start_paused = true)]
async fn retry_budget_bounds_start_calls() {
    let log = Log::default();
    let unit = Arc::new(Probe::new("flaky", Behavior::Fail, &log));
    let retried = Arc::new(AtomicU32::new(0));
    let seen = Arc::clone(&retried);
    let sup = Supervisor::builder(quiet())
        .add_unit(unit.clone())
        .with_retry(
            RetryPolicy::on_any_failure()
                .retry(2)
                .wait_constant(Duration::from_millis(100))
                .on_retry(move |_notice| {
                    seen.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .build()
        .unwrap();

    let status = sup.run_once(true).await.unwrap();

    assert_eq!(status, HostStatus::Faulted);
    assert_eq!(unit.starts.load(Ordering::SeqCst), 3);
    assert_eq!(retried.load(Ordering::SeqCst), 2);
    assert_eq!(unit.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_start_hits_fallback_timeout() {
    let log = Log::default();
    let cfg = HostConfig {
        fallback_timeout: Duration::from_millis(250),
        ..quiet()
    };
    let sup = Supervisor::builder(cfg)
        .add_unit(Arc::new(Probe::new("stuck", Behavior::Hang, &log)))
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    let status = sup.run_once(true).await.unwrap();

    assert_eq!(status, HostStatus::Faulted);
    assert_eq!(
        entries(&log),
        vec!["start:stuck", "error:stuck:unit_timeout", "stop:stuck"]
    );
    let hit = wait_for(&mut rx, EventKind::TimeoutHit).await;
    assert_eq!(hit.timeout_ms, Some(250));
}

#[tokio::test]
async fn panicking_start_is_reported_as_fault() {
    let log = Log::default();
    let sup = Supervisor::builder(quiet())
        .add_unit(Arc::new(Probe::new("p", Behavior::Panic, &log)))
        .build()
        .unwrap();

    let status = sup.run_once(true).await.unwrap();

    assert_eq!(status, HostStatus::Faulted);
    assert!(entries(&log).contains(&"error:p:unit_panicked".to_string()));
}

#[tokio::test]
async fn run_once_without_force_stop_keeps_going_after_fault() {
    let log = Log::default();
    let sup = Supervisor::builder(quiet())
        .add_unit(Arc::new(Probe::new("a", Behavior::Fatal, &log)))
        .add_unit(Arc::new(Probe::new("b", Behavior::Succeed, &log)))
        .build()
        .unwrap();

    let status = sup.run_once(false).await.unwrap();

    assert_eq!(status, HostStatus::Faulted);
    assert_eq!(
        entries(&log),
        vec!["start:a", "error:a:unit_fatal", "start:b", "stop:b", "stop:a"]
    );
}

#[tokio::test(start_paused = true)]
async fn run_once_waits_for_every_start() {
    let log = Log::default();
    let sup = Supervisor::builder(quiet())
        .add_unit(Arc::new(Probe::new(
            "slow",
            Behavior::Sleep(Duration::from_secs(5)),
            &log,
        )))
        .build()
        .unwrap();

    sup.run_once(true).await.unwrap();

    assert_eq!(entries(&log), vec!["start:slow", "ready:slow", "stop:slow"]);
}

#[tokio::test]
async fn vetoed_fault_keeps_host_running() {
    let log = Log::default();
    let healthy = Arc::new(Probe::new("b", Behavior::Succeed, &log));
    let sup = Supervisor::builder(quiet())
        .add_unit(Arc::new(Probe::new("a", Behavior::Fatal, &log).vetoing()))
        .add_unit(healthy.clone())
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    let runner = tokio::spawn({
        let sup = Arc::clone(&sup);
        async move { sup.run_and_block().await }
    });
    wait_for(&mut rx, EventKind::FaultContained).await;

    assert_eq!(sup.status(), HostStatus::Faulted);
    assert!(!sup.is_terminated());
    assert!(sup.stop().await);
    assert_eq!(runner.await.unwrap(), Ok(HostStatus::Faulted));
    assert_eq!(healthy.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_stop_requests_run_the_sequence_once() {
    let log = Log::default();
    let units: Vec<_> = ["a", "b", "c"]
        .into_iter()
        .map(|n| Arc::new(Probe::new(n, Behavior::Succeed, &log)))
        .collect();
    let mut builder = Supervisor::builder(quiet());
    for u in &units {
        builder = builder.add_unit(u.clone());
    }
    let sup = builder.build().unwrap();
    let mut rx = sup.subscribe();

    let runner = tokio::spawn({
        let sup = Arc::clone(&sup);
        async move { sup.run_and_block().await }
    });
    wait_for(&mut rx, EventKind::HostRunning).await;

    let (x, y, z) = tokio::join!(sup.stop(), sup.stop(), sup.stop());
    assert_eq!([x, y, z].iter().filter(|won| **won).count(), 1);

    sup.wait_stopped().await;
    assert_eq!(runner.await.unwrap(), Ok(HostStatus::Stopped));
    for u in &units {
        assert_eq!(u.stops.load(Ordering::SeqCst), 1, "unit {}", u.name);
    }
    let stops: Vec<_> = entries(&log)
        .into_iter()
        .filter(|e| e.starts_with("stop:"))
        .collect();
    assert_eq!(stops, vec!["stop:c", "stop:b", "stop:a"]);
}

#[tokio::test]
async fn second_run_is_rejected() {
    let sup = Supervisor::builder(quiet()).build().unwrap();
    assert_eq!(sup.run_once(true).await, Ok(HostStatus::Stopped));
    assert_eq!(sup.run_once(true).await, Err(HostError::AlreadyRunning));
}

#[tokio::test]
async fn deferred_units_start_only_on_trigger() {
    let log = Log::default();
    let sup = Supervisor::builder(quiet())
        .add_unit(Arc::new(Probe::new("a", Behavior::Succeed, &log)))
        .add_unit(Arc::new(Probe::new("b", Behavior::Succeed, &log)))
        .defer_to_triggers(true)
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    let runner = tokio::spawn({
        let sup = Arc::clone(&sup);
        async move { sup.run_and_block().await }
    });
    wait_for(&mut rx, EventKind::HostRunning).await;
    assert!(entries(&log).is_empty());

    sup.trigger("a").await.unwrap();
    let started = wait_for(&mut rx, EventKind::UnitStarted).await;
    assert_eq!(started.unit.as_deref(), Some("a"));

    assert!(matches!(
        sup.trigger("a").await,
        Err(HostError::TriggerRejected { .. })
    ));
    assert_eq!(
        sup.trigger("missing").await,
        Err(HostError::UnknownUnit {
            name: "missing".into()
        })
    );

    assert!(sup.stop().await);
    assert_eq!(runner.await.unwrap(), Ok(HostStatus::Stopped));
    assert_eq!(entries(&log), vec!["start:a", "stop:a"]);
}

#[tokio::test]
async fn trigger_requires_deferred_mode() {
    let log = Log::default();
    let sup = Supervisor::builder(quiet())
        .add_unit(Arc::new(Probe::new("a", Behavior::Succeed, &log)))
        .build()
        .unwrap();
    assert!(matches!(
        sup.trigger("a").await,
        Err(HostError::TriggerRejected { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn slow_unit_stop_is_bounded_by_grace() {
    let log = Log::default();
    let cfg = HostConfig {
        grace: Duration::from_millis(100),
        ..quiet()
    };
    let sup = Supervisor::builder(cfg)
        .add_unit(Arc::new(Probe::new("a", Behavior::Succeed, &log)))
        .add_unit(Arc::new(
            Probe::new("b", Behavior::Succeed, &log).slow_stop(Duration::from_secs(3600)),
        ))
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    let status = sup.run_once(true).await.unwrap();

    assert_eq!(status, HostStatus::Stopped);
    assert_eq!(entries(&log), vec!["start:a", "start:b", "stop:a"]);
    let failed = wait_for(&mut rx, EventKind::UnitStopFailed).await;
    assert_eq!(failed.unit.as_deref(), Some("b"));
}

struct Surface {
    disposed: AtomicU32,
}

#[async_trait]
impl WebSurface for Surface {
    async fn dispose(&self) {
        self.disposed.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn web_surface_is_disposed_once() {
    let surface = Arc::new(Surface {
        disposed: AtomicU32::new(0),
    });
    let sup = Supervisor::builder(quiet()).build().unwrap();
    sup.attach_web_surface(surface.clone());

    sup.run_once(true).await.unwrap();
    assert!(!sup.stop().await);

    assert_eq!(surface.disposed.load(Ordering::SeqCst), 1);
}

struct StopWatcher {
    saw_stop: Arc<AtomicBool>,
}

#[async_trait]
impl Subscribe for StopWatcher {
    async fn on_event(&self, ev: &Event) {
        if ev.kind == EventKind::HostStopped {
            self.saw_stop.store(true, Ordering::SeqCst);
        }
    }

    fn name(&self) -> &'static str {
        "stop-watcher"
    }
}

#[tokio::test]
async fn subscribers_receive_host_events() {
    let saw_stop = Arc::new(AtomicBool::new(false));
    let sup = Supervisor::builder(quiet())
        .with_subscribers(vec![Arc::new(StopWatcher {
            saw_stop: Arc::clone(&saw_stop),
        })])
        .build()
        .unwrap();

    sup.run_once(true).await.unwrap();

    for _ in 0..50 {
        if saw_stop.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(saw_stop.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn failure_after_stop_keeps_host_stopped() {
    let log = Log::default();
    let late = Arc::new(Probe::new(
        "late",
        Behavior::SleepThenFail(Duration::from_secs(1)),
        &log,
    ));
    let sup = Supervisor::builder(quiet())
        .add_unit(late.clone())
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    let runner = tokio::spawn({
        let sup = Arc::clone(&sup);
        async move { sup.run_and_block().await }
    });
    wait_for(&mut rx, EventKind::HostRunning).await;

    assert!(sup.stop().await);
    assert_eq!(sup.status(), HostStatus::Stopped);
    assert!(sup.is_terminated());

    assert_eq!(runner.await.unwrap(), Ok(HostStatus::Stopped));
    let canceled = wait_for(&mut rx, EventKind::UnitCanceled).await;
    assert_eq!(canceled.unit.as_deref(), Some("late"));
    assert_eq!(sup.status(), HostStatus::Stopped);
    assert!(sup.is_healthy());
    assert!(!entries(&log).iter().any(|e| e.starts_with("error:")));
    assert_eq!(late.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn duplicate_registrations_start_one_per_trigger() {
    let starts = Arc::new(AtomicU32::new(0));
    let unit = |starts: Arc<AtomicU32>| {
        UnitFn::new("dup", move |_ctx, _token| {
            let starts = Arc::clone(&starts);
            async move {
                starts.fetch_add(1, Ordering::SeqCst);
                Ok::<(), UnitError>(())
            }
        })
        .arc()
    };
    let sup = Supervisor::builder(quiet())
        .add_unit(unit(Arc::clone(&starts)))
        .add_unit(unit(Arc::clone(&starts)))
        .defer_to_triggers(true)
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    let runner = tokio::spawn({
        let sup = Arc::clone(&sup);
        async move { sup.run_and_block().await }
    });
    wait_for(&mut rx, EventKind::HostRunning).await;

    sup.trigger("dup").await.unwrap();
    sup.trigger("dup").await.unwrap();
    assert!(matches!(
        sup.trigger("dup").await,
        Err(HostError::TriggerRejected { .. })
    ));

    wait_for(&mut rx, EventKind::UnitStarted).await;
    wait_for(&mut rx, EventKind::UnitStarted).await;
    assert_eq!(starts.load(Ordering::SeqCst), 2);

    assert!(sup.stop().await);
    assert_eq!(runner.await.unwrap(), Ok(HostStatus::Stopped));
}

#[tokio::test(start_paused = true)]
async fn fault_racing_stop_request_stops_each_unit_once() {
    let log = Log::default();
    let units = vec![
        Arc::new(Probe::new("a", Behavior::Succeed, &log)),
        Arc::new(Probe::new(
            "b",
            Behavior::SleepThenFail(Duration::from_millis(100)),
            &log,
        )),
        Arc::new(Probe::new("c", Behavior::Succeed, &log)),
    ];
    let mut builder = Supervisor::builder(quiet());
    for u in &units {
        builder = builder.add_unit(u.clone());
    }
    let sup = builder.build().unwrap();
    let mut rx = sup.subscribe();

    let runner = tokio::spawn({
        let sup = Arc::clone(&sup);
        async move { sup.run_and_block().await }
    });
    wait_for(&mut rx, EventKind::HostRunning).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    sup.stop().await;
    sup.wait_stopped().await;
    let status = runner.await.unwrap().unwrap();
    assert!(matches!(status, HostStatus::Stopped | HostStatus::Faulted));

    let mut stopped = Vec::new();
    loop {
        let ev = rx.recv().await.unwrap();
        match ev.kind {
            EventKind::UnitStopped => {
                stopped.push(ev.unit.as_deref().unwrap_or_default().to_string());
            }
            EventKind::HostStopped => break,
            _ => {}
        }
    }
    assert_eq!(stopped, vec!["c", "b", "a"]);
    for u in &units {
        assert_eq!(u.stops.load(Ordering::SeqCst), 1, "unit {}", u.name);
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_still_stop_in_reverse_registration_order() {
    let log = Log::default();
    let sup = Supervisor::builder(quiet())
        .add_unit(sleepy("a", 300, &log))
        .add_unit(sleepy("b", 100, &log))
        .add_unit(sleepy("c", 200, &log))
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    let runner = tokio::spawn({
        let sup = Arc::clone(&sup);
        async move { sup.run_and_block().await }
    });
    for _ in 0..3 {
        wait_for(&mut rx, EventKind::UnitStarted).await;
    }
    assert!(sup.stop().await);
    assert_eq!(runner.await.unwrap(), Ok(HostStatus::Stopped));

    let log = entries(&log);
    let ready: Vec<_> = log.iter().filter(|e| e.starts_with("ready:")).collect();
    let stops: Vec<_> = log.iter().filter(|e| e.starts_with("stop:")).collect();
    assert_eq!(ready, vec!["ready:b", "ready:c", "ready:a"]);
    assert_eq!(stops, vec!["stop:c", "stop:b", "stop:a"]);
}

#[tokio::test(start_paused = true)]
async fn sequential_mode_awaits_each_start_before_the_next() {
    let log = Log::default();
    let cfg = HostConfig {
        start_mode: StartMode::Sequential,
        ..quiet()
    };
    let sup = Supervisor::builder(cfg)
        .add_unit(sleepy("a", 300, &log))
        .add_unit(sleepy("b", 100, &log))
        .add_unit(sleepy("c", 200, &log))
        .build()
        .unwrap();
    let mut rx = sup.subscribe();

    let runner = tokio::spawn({
        let sup = Arc::clone(&sup);
        async move { sup.run_and_block().await }
    });
    wait_for(&mut rx, EventKind::HostRunning).await;
    assert!(sup.stop().await);
    assert_eq!(runner.await.unwrap(), Ok(HostStatus::Stopped));

    assert_eq!(
        entries(&log),
        vec![
            "start:a", "ready:a", "start:b", "ready:b", "start:c", "ready:c", "stop:c", "stop:b",
            "stop:a",
        ]
    );
}
