//! The dispatcher driven through the scheduler, the way applications use it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use lull_core::{DispatcherConfig, IdleDispatcher, IdleScheduler, SchedulerKind};
use tokio::runtime::Handle;

fn config() -> DispatcherConfig {
    DispatcherConfig {
        quiet_period: Duration::from_millis(10),
        max_window: Duration::from_millis(50),
    }
}

#[tokio::test(start_paused = true)]
async fn native_scheduler_forwards_timeout_and_cancel() {
    let dispatcher = IdleDispatcher::start(&Handle::current(), config());
    let scheduler = IdleScheduler::native(dispatcher.clone());
    assert_eq!(scheduler.kind(), SchedulerKind::NativeIdle);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let slot = Arc::clone(&seen);
    let _busy = dispatcher.activity();

    let handle = scheduler.run_when_idle(
        move |deadline| slot.lock().unwrap().push(deadline.did_timeout()),
        Some(Duration::from_millis(50)),
    );
    assert_eq!(dispatcher.pending(), 1);

    handle.cancel();
    handle.cancel();
    assert_eq!(dispatcher.pending(), 0);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn native_timeout_fires_with_did_timeout() {
    let dispatcher = IdleDispatcher::start(&Handle::current(), config());
    let scheduler = IdleScheduler::native(dispatcher.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let slot = Arc::clone(&seen);
    let _busy = dispatcher.activity();

    let _handle = scheduler.run_when_idle(
        move |deadline| slot.lock().unwrap().push(deadline.did_timeout()),
        Some(Duration::from_millis(50)),
    );

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert!(seen.lock().unwrap().is_empty());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(*seen.lock().unwrap(), vec![true]);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_dispatch() {
    let dispatcher = IdleDispatcher::start(&Handle::current(), config());
    let scheduler = IdleScheduler::native(dispatcher.clone());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let slot = Arc::clone(&seen);
    let busy = dispatcher.activity();

    let _handle = scheduler.run_when_idle(move |_| slot.lock().unwrap().push(()), None);
    dispatcher.shutdown();
    drop(busy);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(seen.lock().unwrap().is_empty());
}
