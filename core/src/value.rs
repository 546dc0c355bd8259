//! Values computed on idle time, or on first use if idle time never comes.
//!
//! An [`IdleValue`] schedules its producer through an [`IdleScheduler`] as soon
//! as it is built. If the scheduled run happens first, [`IdleValue::get_value`]
//! just returns the stored outcome. If the value is needed before that, the
//! pending schedule is cancelled and the producer runs inline on the caller's
//! thread. Either way the producer runs at most once, and a failure is stored
//! and handed back on every later access.

use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use lull_types::IdleValueState;

use crate::scheduler::{CancelHandle, IdleScheduler};

type Producer<T, E> = Box<dyn FnOnce() -> Result<T, E> + Send + 'static>;

struct Slot<T, E> {
    producer: Mutex<Option<Producer<T, E>>>,
    outcome: OnceLock<Result<T, E>>,
}

impl<T, E> Slot<T, E> {
    /// Run the producer unless it already ran; concurrent callers wait for the
    /// first one and share its outcome.
    fn run(&self) -> &Result<T, E> {
        self.outcome.get_or_init(|| {
            let producer = self
                .producer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            match producer {
                Some(producer) => producer(),
                None => panic!("idle value producer panicked during an earlier run"),
            }
        })
    }
}

/// A lazily computed value whose producer runs during idle time.
pub struct IdleValue<T, E = Infallible> {
    slot: Arc<Slot<T, E>>,
    cancel: CancelHandle,
}

impl<T, E> IdleValue<T, E>
where
    T: Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    /// Wrap `producer` and schedule it for the next idle window.
    pub fn new<F>(scheduler: &IdleScheduler, producer: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        Self::schedule(scheduler, None, Box::new(producer))
    }

    /// Like [`IdleValue::new`], passing `timeout` to the host as a hint for the
    /// longest acceptable wait.
    pub fn with_timeout<F>(scheduler: &IdleScheduler, timeout: Duration, producer: F) -> Self
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
    {
        Self::schedule(scheduler, Some(timeout), Box::new(producer))
    }

    fn schedule(
        scheduler: &IdleScheduler,
        timeout: Option<Duration>,
        producer: Producer<T, E>,
    ) -> Self {
        let slot = Arc::new(Slot {
            producer: Mutex::new(Some(producer)),
            outcome: OnceLock::new(),
        });

        let runner: Weak<Slot<T, E>> = Arc::downgrade(&slot);
        let cancel = scheduler.run_when_idle(
            move |deadline| {
                let Some(slot) = runner.upgrade() else {
                    return;
                };
                let failed = slot.run().is_err();
                tracing::debug!(
                    value = std::any::type_name::<T>(),
                    did_timeout = deadline.did_timeout(),
                    failed,
                    "Idle value computed on idle time"
                );
            },
            timeout,
        );

        Self { slot, cancel }
    }

    /// Cancel the pending idle run.
    ///
    /// Does nothing if the producer already ran. The value can still be
    /// computed later through [`IdleValue::get_value`].
    pub fn dispose(&self) {
        self.cancel.cancel();
    }

    /// The producer's outcome, computing it now if it has not run yet.
    ///
    /// A failed producer yields the same error on every call.
    pub fn get_value(&self) -> Result<&T, &E> {
        if self.slot.outcome.get().is_none() {
            tracing::debug!(
                value = std::any::type_name::<T>(),
                "Idle value needed before idle time; computing now"
            );
            self.dispose();
        }
        self.slot.run().as_ref()
    }

    /// The outcome if the producer already ran, without forcing it.
    #[must_use]
    pub fn try_get(&self) -> Option<Result<&T, &E>> {
        self.slot.outcome.get().map(Result::as_ref)
    }

    #[must_use]
    pub fn state(&self) -> IdleValueState {
        match self.slot.outcome.get() {
            Some(Ok(_)) => IdleValueState::Completed,
            Some(Err(_)) => IdleValueState::Failed,
            None if self.cancel.is_cancelled() => IdleValueState::Disposed,
            None => IdleValueState::Pending,
        }
    }
}

impl<T> IdleValue<T, Infallible>
where
    T: Send + Sync + 'static,
{
    /// Idle value for a producer that cannot fail.
    pub fn infallible<F>(scheduler: &IdleScheduler, producer: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::new(scheduler, move || Ok(producer()))
    }

    #[must_use]
    pub fn get(&self) -> &T {
        match self.get_value() {
            Ok(value) => value,
            Err(never) => match *never {},
        }
    }
}

impl<T, E> Drop for IdleValue<T, E> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl<T, E> fmt::Debug for IdleValue<T, E>
where
    T: fmt::Debug,
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleValue")
            .field("outcome", &self.slot.outcome.get())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{IdleCallback, IdleHost};
    use lull_types::{IdleCallbackId, IdleDeadline};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Idle host that only runs callbacks when told to.
    #[derive(Default)]
    struct ManualHost {
        queue: Mutex<Vec<(IdleCallbackId, IdleCallback)>>,
        next: AtomicUsize,
    }

    impl ManualHost {
        fn go_idle(&self) {
            let callbacks = std::mem::take(&mut *self.queue.lock().unwrap());
            let deadline = IdleDeadline::fallback();
            for (_, callback) in callbacks {
                callback(&deadline);
            }
        }

        fn pending(&self) -> usize {
            self.queue.lock().unwrap().len()
        }
    }

    impl IdleHost for ManualHost {
        fn request_idle_callback(
            &self,
            callback: IdleCallback,
            _timeout: Option<Duration>,
        ) -> IdleCallbackId {
            let id = IdleCallbackId::new(self.next.fetch_add(1, Ordering::SeqCst) as u64);
            self.queue.lock().unwrap().push((id, callback));
            id
        }

        fn cancel_idle_callback(&self, id: IdleCallbackId) {
            self.queue.lock().unwrap().retain(|(queued, _)| *queued != id);
        }
    }

    fn manual() -> (Arc<ManualHost>, IdleScheduler) {
        let host = Arc::new(ManualHost::default());
        let scheduler = IdleScheduler::native(host.clone());
        (host, scheduler)
    }

    fn counted(calls: &Arc<AtomicUsize>, value: u32) -> impl FnOnce() -> u32 + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            value
        }
    }

    #[test]
    fn idle_run_is_memoized() {
        let (host, scheduler) = manual();
        let calls = Arc::new(AtomicUsize::new(0));
        let value = IdleValue::infallible(&scheduler, counted(&calls, 42));
        assert_eq!(value.state(), IdleValueState::Pending);

        host.go_idle();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(value.state(), IdleValueState::Completed);

        for _ in 0..5 {
            assert_eq!(*value.get(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn get_value_before_idle_runs_inline_and_cancels_schedule() {
        let (host, scheduler) = manual();
        let calls = Arc::new(AtomicUsize::new(0));
        let value = IdleValue::infallible(&scheduler, counted(&calls, 7));
        assert_eq!(host.pending(), 1);

        assert_eq!(*value.get(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(host.pending(), 0);

        host.go_idle();
        assert_eq!(*value.get(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dispose_blocks_idle_run_until_forced() {
        let (host, scheduler) = manual();
        let calls = Arc::new(AtomicUsize::new(0));
        let value = IdleValue::infallible(&scheduler, counted(&calls, 3));

        value.dispose();
        value.dispose();
        assert_eq!(value.state(), IdleValueState::Disposed);
        host.go_idle();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(value.try_get().is_none());

        assert_eq!(*value.get(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(value.state(), IdleValueState::Completed);
    }

    #[test]
    fn dispose_after_run_keeps_outcome() {
        let (host, scheduler) = manual();
        let calls = Arc::new(AtomicUsize::new(0));
        let value = IdleValue::infallible(&scheduler, counted(&calls, 9));

        host.go_idle();
        value.dispose();
        value.dispose();

        assert_eq!(value.state(), IdleValueState::Completed);
        assert_eq!(value.try_get().map(|r| r.copied()), Some(Ok(9)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_is_stored_and_repeated() {
        let (host, scheduler) = manual();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let value: IdleValue<u32, std::io::Error> = IdleValue::new(&scheduler, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(std::io::Error::other("boom"))
        });

        host.go_idle();
        assert_eq!(value.state(), IdleValueState::Failed);

        let first = value.get_value().unwrap_err();
        let second = value.get_value().unwrap_err();
        assert_eq!(first.to_string(), "boom");
        assert_eq!(second.to_string(), "boom");
        assert!(std::ptr::eq(first, second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn forced_failure_is_stored_too() {
        let (_host, scheduler) = manual();
        let value: IdleValue<u32, String> =
            IdleValue::new(&scheduler, || Err("boom".to_string()));

        assert_eq!(value.get_value(), Err(&"boom".to_string()));
        assert_eq!(value.get_value(), Err(&"boom".to_string()));
        assert_eq!(value.state(), IdleValueState::Failed);
    }

    #[test]
    fn drop_cancels_pending_run() {
        let (host, scheduler) = manual();
        let calls = Arc::new(AtomicUsize::new(0));
        let value = IdleValue::infallible(&scheduler, counted(&calls, 1));

        drop(value);
        assert_eq!(host.pending(), 0);
        host.go_idle();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn fallback_scheduler_computes_in_background() {
        let scheduler = IdleScheduler::current().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let value = IdleValue::infallible(&scheduler, counted(&calls, 42));

        for _ in 0..10 {
            if value.try_get().is_some() {
                break;
            }
            tokio::task::yield_now().await;
        }

        assert_eq!(value.state(), IdleValueState::Completed);
        assert_eq!(*value.get(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fallback_get_before_timer_runs_inline() {
        let scheduler = IdleScheduler::current().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let value = IdleValue::infallible(&scheduler, counted(&calls, 5));

        assert_eq!(*value.get(), 5);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_accessors_share_one_run() {
        let scheduler = IdleScheduler::current().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let value = Arc::new(IdleValue::infallible(&scheduler, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(5));
            11_u32
        }));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let value = Arc::clone(&value);
                std::thread::spawn(move || *value.get())
            })
            .collect();
        for reader in readers {
            assert_eq!(reader.join().unwrap(), 11);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
