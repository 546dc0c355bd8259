//! End-to-end behavior of idle values on both scheduler strategies.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use lull_config::IdleSettings;
use lull_core::{IdleRuntime, IdleScheduler, IdleValue, IdleValueState};
use lull_types::SchedulerMode;
use tokio::runtime::Handle;

fn runtime(mode: SchedulerMode) -> IdleRuntime {
    let settings = IdleSettings {
        mode,
        quiet_period: Duration::from_millis(10),
        max_window: Duration::from_millis(50),
    };
    IdleRuntime::start(&settings, &Handle::current())
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

#[tokio::test(start_paused = true)]
async fn producer_returning_42_runs_once() {
    for mode in [SchedulerMode::Native, SchedulerMode::Fallback] {
        let runtime = runtime(mode);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let value = IdleValue::infallible(runtime.scheduler(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            42
        });

        settle().await;
        for _ in 0..3 {
            assert_eq!(*value.get(), 42, "mode {mode}");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1, "mode {mode}");
    }
}

#[tokio::test(start_paused = true)]
async fn producer_failing_with_boom_fails_every_time() {
    for mode in [SchedulerMode::Native, SchedulerMode::Fallback] {
        let runtime = runtime(mode);
        let value: IdleValue<u32, std::io::Error> =
            IdleValue::new(runtime.scheduler(), || Err(std::io::Error::other("boom")));

        settle().await;
        assert_eq!(value.state(), IdleValueState::Failed);
        for _ in 0..3 {
            let err = value.get_value().unwrap_err();
            assert_eq!(err.to_string(), "boom", "mode {mode}");
        }
    }
}

#[tokio::test(start_paused = true)]
async fn busy_host_forces_synchronous_computation() {
    let runtime = runtime(SchedulerMode::Native);
    let _busy = runtime.activity().expect("native mode has an idle host");
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let value = IdleValue::infallible(runtime.scheduler(), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        "ready"
    });

    settle().await;
    assert_eq!(value.state(), IdleValueState::Pending);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(*value.get(), "ready");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    let dispatcher = runtime.dispatcher().expect("native mode has an idle host");
    assert_eq!(dispatcher.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn disposed_value_waits_for_accessor() {
    let runtime = runtime(SchedulerMode::Native);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let value = IdleValue::infallible(runtime.scheduler(), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        1_u8
    });

    value.dispose();
    settle().await;
    assert_eq!(value.state(), IdleValueState::Disposed);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    assert_eq!(*value.get(), 1);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn timeout_hint_beats_busy_host() {
    let runtime = runtime(SchedulerMode::Native);
    let _busy = runtime.activity();
    let value = IdleValue::<_, std::convert::Infallible>::with_timeout(
        runtime.scheduler(),
        Duration::from_millis(30),
        || Ok(String::from("warm")),
    );

    settle().await;
    assert_eq!(value.state(), IdleValueState::Completed);
    assert_eq!(value.try_get().map(|r| r.ok().cloned()), Some(Some("warm".to_string())));
}

#[tokio::test]
async fn values_share_one_scheduler() {
    let scheduler = IdleScheduler::current().unwrap();
    let values: Vec<_> = (0..16_u64)
        .map(|n| IdleValue::infallible(&scheduler, move || n * n))
        .collect();

    for (n, value) in values.iter().enumerate() {
        assert_eq!(*value.get(), (n * n) as u64);
    }
}
