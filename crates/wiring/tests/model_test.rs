//! Model-level behaviour: health monitoring, heartbeats, metrics, config
//! and the stop lifecycle.

mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use common::{assert_eventually, quiet_model, Gate, TIMEOUT};
use ledger_wiring::{
    Capacity, InMemoryMetrics, MetricsSink, ModelState, SolderType, TaskError, TaskSchedulerType,
    WiringConfig, WiringError, WiringModel,
};

#[test]
fn health_monitor_reports_overloaded_schedulers() {
    let model = WiringModel::builder()
        .with_default_pool_size(4)
        .with_health_monitor_period(Duration::from_millis(5))
        .with_healthy_report_threshold(Duration::from_millis(20))
        .build()
        .unwrap();

    let overloaded = model
        .scheduler_builder::<()>("overloaded")
        .unwrap()
        .with_unhandled_task_capacity(2)
        .build()
        .unwrap();
    let input = overloaded.build_input_wire::<u32>("in");
    let gate = Arc::new(Gate::new());
    {
        let gate = Arc::clone(&gate);
        input.bind_consumer(move |_| gate.wait()).unwrap();
    }

    let reports: Arc<Mutex<Vec<Duration>>> = Arc::default();
    {
        let reports = Arc::clone(&reports);
        model
            .health_monitor_wire()
            .solder_to_fn("health_log", "unhealthy duration", move |d| {
                reports.lock().unwrap().push(d)
            })
            .unwrap();
    }

    model.start().unwrap();
    assert_eq!(model.unhealthy_duration(), Duration::ZERO);

    for i in 0..5 {
        input.inject(i).unwrap();
    }
    assert_eq!(overloaded.unprocessed_task_count(), 5);

    assert_eventually(
        || model.unhealthy_duration() > Duration::ZERO,
        TIMEOUT,
        "over-capacity scheduler is seen as unhealthy",
    );
    assert_eventually(
        || reports.lock().unwrap().iter().any(|d| !d.is_zero()),
        TIMEOUT,
        "unhealthy duration is forwarded",
    );

    gate.open();
    assert_eventually(
        || model.unhealthy_duration() == Duration::ZERO,
        TIMEOUT,
        "drained scheduler is healthy again",
    );
    assert_eventually(
        || reports.lock().unwrap().last() == Some(&Duration::ZERO),
        TIMEOUT,
        "recovery is reported",
    );
    model.stop().unwrap();
}

#[test]
fn healthy_system_reports_zero_periodically() {
    let model = WiringModel::builder()
        .with_default_pool_size(2)
        .with_health_monitor_period(Duration::from_millis(2))
        .with_healthy_report_threshold(Duration::from_millis(10))
        .build()
        .unwrap();
    let reports = Arc::new(AtomicUsize::new(0));
    {
        let reports = Arc::clone(&reports);
        model
            .health_monitor_wire()
            .solder_to_fn("health_log", "unhealthy duration", move |d| {
                assert!(d.is_zero());
                reports.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
    }
    model.start().unwrap();
    assert_eventually(|| reports.load(Ordering::SeqCst) >= 3, TIMEOUT, "periodic zero reports");
    model.stop().unwrap();
}

#[test]
fn heartbeat_wire_delivers_instants() {
    let model = quiet_model();
    let ticker = model
        .scheduler_builder::<()>("ticker")
        .unwrap()
        .build()
        .unwrap();
    let input = ticker.build_input_wire::<Instant>("tick");
    let ticks: Arc<Mutex<Vec<Instant>>> = Arc::default();
    {
        let ticks = Arc::clone(&ticks);
        input.bind_consumer(move |t| ticks.lock().unwrap().push(t)).unwrap();
    }
    model
        .build_heartbeat_wire_with_frequency(200.0)
        .unwrap()
        .solder_to(&input, SolderType::Put)
        .unwrap();
    assert_eq!(
        model.describe_wiring(),
        vec!["Heartbeat -[tick/PUT]-> ticker".to_string()]
    );

    model.start().unwrap();
    assert_eventually(|| ticks.lock().unwrap().len() >= 5, TIMEOUT, "heartbeats arrive");
    model.stop().unwrap();

    let ticks = ticks.lock().unwrap();
    assert!(ticks.windows(2).all(|w| w[0] <= w[1]), "heartbeats go forward in time");
}

#[test]
fn stop_releases_a_blocked_put() {
    let model = quiet_model();
    let scheduler = model
        .scheduler_builder::<()>("full")
        .unwrap()
        .with_unhandled_task_capacity(1)
        .build()
        .unwrap();
    let input = scheduler.build_input_wire::<u32>("in");
    let gate = Arc::new(Gate::new());
    {
        let gate = Arc::clone(&gate);
        input.bind_consumer(move |_| gate.wait()).unwrap();
    }
    model.start().unwrap();
    input.put(0).unwrap();

    let result = Arc::new(Mutex::new(None));
    let blocked = {
        let input = input.clone();
        let result = Arc::clone(&result);
        thread::spawn(move || {
            *result.lock().unwrap() = Some(input.put(1));
        })
    };
    thread::sleep(Duration::from_millis(20));
    assert!(result.lock().unwrap().is_none(), "put should be blocked");

    model.stop().unwrap();
    blocked.join().unwrap();
    assert!(matches!(
        result.lock().unwrap().take(),
        Some(Err(WiringError::Stopped(name))) if name == "full"
    ));
    assert!(matches!(input.offer(2), Err(WiringError::Stopped(_))));
    assert!(matches!(input.inject(3), Err(WiringError::Stopped(_))));
    gate.open();
}

#[test]
fn dropping_a_running_model_drains_dedicated_threads() {
    let handled = Arc::new(AtomicUsize::new(0));
    let input = {
        let model = quiet_model();
        let scheduler = model
            .scheduler_builder::<()>("dedicated")
            .unwrap()
            .with_type(TaskSchedulerType::SequentialThread)
            .build()
            .unwrap();
        let input = scheduler.build_input_wire::<u32>("in");
        {
            let handled = Arc::clone(&handled);
            input
                .bind_consumer(move |_| {
                    thread::sleep(Duration::from_micros(50));
                    handled.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        model.start().unwrap();
        for i in 0..100 {
            input.put(i).unwrap();
        }
        assert_eq!(model.state(), ModelState::Running);
        input
    };
    assert_eq!(handled.load(Ordering::SeqCst), 100);
    assert!(input.put(100).is_err());
}

#[test]
fn scheduler_metrics_reach_the_sink() {
    let metrics = Arc::new(InMemoryMetrics::new());
    let model = WiringModel::builder()
        .with_default_pool_size(2)
        .with_health_monitor_enabled(false)
        .with_metrics(Arc::clone(&metrics) as Arc<dyn MetricsSink>)
        .build()
        .unwrap();
    let scheduler = model
        .scheduler_builder::<()>("measured")
        .unwrap()
        .with_busy_fraction_metrics_enabled(true)
        .with_unhandled_task_metric_enabled(true)
        .with_flushing_enabled(true)
        .build()
        .unwrap();
    let quiet = model
        .scheduler_builder::<()>("unmeasured")
        .unwrap()
        .build()
        .unwrap();
    let input = scheduler.build_input_wire::<u32>("in");
    input
        .bind_consumer(|_| thread::sleep(Duration::from_micros(200)))
        .unwrap();
    quiet.build_input_wire::<u32>("in").bind_consumer(|_| {}).unwrap();

    model.start().unwrap();
    for i in 0..10 {
        input.put(i).unwrap();
    }
    scheduler.flush().unwrap();

    assert_eventually(
        || metrics.scheduler("measured").map(|g| g.busy_reports) == Some(10),
        TIMEOUT,
        "one busy report per task",
    );
    assert_eventually(
        || metrics.scheduler("measured").and_then(|g| g.unprocessed_tasks) == Some(0),
        TIMEOUT,
        "last report sees an empty scheduler",
    );
    let fraction = metrics.scheduler("measured").unwrap().busy_fraction.unwrap();
    assert!((0.0..=1.0).contains(&fraction), "busy fraction {fraction}");
    assert!(metrics.scheduler("unmeasured").is_none());

    let snapshot = metrics.snapshot();
    assert!(snapshot.schedulers.contains_key("measured"));
    model.stop().unwrap();
}

#[test]
fn model_exception_handler_is_the_fallback() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let model = {
        let seen = Arc::clone(&seen);
        WiringModel::builder()
            .with_default_pool_size(2)
            .with_health_monitor_enabled(false)
            .with_uncaught_exception_handler(move |failure| {
                seen.lock().unwrap().push(failure.scheduler.clone());
            })
            .build()
            .unwrap()
    };
    let own_handler_called = Arc::new(AtomicBool::new(false));
    let inherits = model
        .scheduler_builder::<()>("inherits")
        .unwrap()
        .build()
        .unwrap();
    let overrides = {
        let called = Arc::clone(&own_handler_called);
        model
            .scheduler_builder::<()>("overrides")
            .unwrap()
            .with_uncaught_exception_handler(move |failure| {
                assert!(matches!(failure.error, TaskError::Panicked(_)));
                called.store(true, Ordering::SeqCst);
            })
            .build()
            .unwrap()
    };
    for scheduler in [&inherits, &overrides] {
        scheduler
            .build_input_wire::<u32>("in")
            .bind_consumer(|x| panic!("bad input {x}"))
            .unwrap();
    }
    let inherits_in = inherits.build_input_wire::<u32>("more");
    inherits_in.bind_consumer(|x| panic!("bad input {x}")).unwrap();

    model.start().unwrap();
    inherits_in.put(1).unwrap();
    inherits_in.put(2).unwrap();

    assert_eventually(|| seen.lock().unwrap().len() == 2, TIMEOUT, "model handler called");
    assert!(seen.lock().unwrap().iter().all(|s| s == "inherits"));
    assert!(!own_handler_called.load(Ordering::SeqCst));
    model.stop().unwrap();
}

#[test]
fn schedulers_can_be_configured_from_toml() {
    let config = WiringConfig::from_toml(
        r#"
        [model]
        default_pool_size = 2
        health_monitor_enabled = false

        [schedulers]
        hasher = "SEQUENTIAL_THREAD CAPACITY(25) FLUSHABLE"
        writer = "NO_OP"
        "#,
    )
    .unwrap();

    let model = WiringModel::builder().with_config(&config.model).build().unwrap();
    let hasher = model
        .scheduler_builder::<()>("hasher")
        .unwrap()
        .configure(&config.scheduler("hasher"))
        .build()
        .unwrap();
    let writer = model
        .scheduler_builder::<()>("writer")
        .unwrap()
        .with_unhandled_task_capacity(10)
        .configure(&config.scheduler("writer"))
        .build()
        .unwrap();
    let plain = model
        .scheduler_builder::<()>("plain")
        .unwrap()
        .configure(&config.scheduler("plain"))
        .build()
        .unwrap();

    assert_eq!(hasher.scheduler_type(), TaskSchedulerType::SequentialThread);
    assert_eq!(hasher.capacity(), Capacity::Bounded(25));
    assert!(hasher.insertion_is_blocking());
    assert_eq!(writer.scheduler_type(), TaskSchedulerType::NoOp);
    assert_eq!(writer.capacity(), Capacity::Bounded(10));
    assert_eq!(plain.scheduler_type(), TaskSchedulerType::Sequential);
    assert_eq!(plain.capacity(), Capacity::Unlimited);

    let input = hasher.build_input_wire::<u32>("in");
    input.bind_consumer(|_| {}).unwrap();
    model.start().unwrap();
    for i in 0..50 {
        input.put(i).unwrap();
    }
    hasher.flush().unwrap();
    model.stop().unwrap();
}
