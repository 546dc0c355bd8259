//! A native idle host for tokio applications.
//!
//! The application tells the dispatcher when it is busy, either by holding an
//! [`ActivityGuard`] around foreground work or by calling
//! [`IdleDispatcher::record_activity`]. Once nobody holds a guard and the host
//! has been quiet for `quiet_period`, an idle window of at most `max_window`
//! opens and queued callbacks run in registration order until the window
//! closes, activity resumes, or the queue drains.
//!
//! A callback whose timeout hint expires runs even while the host is busy, with
//! a deadline reporting `did_timeout() == true` and no time remaining.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use lull_config::IdleSettings;
use lull_types::{IdleCallbackId, IdleDeadline};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::host::{IdleCallback, IdleHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Quiet time required before an idle window opens.
    pub quiet_period: Duration,
    /// Longest single idle window.
    pub max_window: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        let settings = IdleSettings::default();
        Self::from(&settings)
    }
}

impl From<&IdleSettings> for DispatcherConfig {
    fn from(settings: &IdleSettings) -> Self {
        Self {
            quiet_period: settings.quiet_period,
            max_window: settings.max_window,
        }
    }
}

struct Entry {
    callback: IdleCallback,
    expires_at: Option<Instant>,
}

struct Window {
    opened_at: Instant,
    ends_at: Instant,
}

struct DispatchState {
    queue: BTreeMap<IdleCallbackId, Entry>,
    next_id: IdleCallbackId,
    busy: usize,
    last_activity: Instant,
    /// End of the most recent window; the next one needs a fresh quiet period.
    quiet_from: Instant,
    window: Option<Window>,
    closed: bool,
}

enum Action {
    Run {
        id: IdleCallbackId,
        callback: IdleCallback,
        deadline: IdleDeadline,
    },
    Wait(Option<Instant>),
    Closed,
}

struct Shared {
    state: Mutex<DispatchState>,
    wake: Notify,
    config: DispatcherConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_action(&self, now: Instant) -> Action {
        let mut state = self.lock();
        if state.closed {
            return Action::Closed;
        }

        let expired = state
            .queue
            .iter()
            .find(|(_, entry)| entry.expires_at.is_some_and(|at| at <= now))
            .map(|(id, _)| *id);
        if let Some(id) = expired
            && let Some(entry) = state.queue.remove(&id)
        {
            return Action::Run {
                id,
                callback: entry.callback,
                deadline: IdleDeadline::timed_out(),
            };
        }

        if state.queue.is_empty() {
            if state.window.take().is_some() {
                state.quiet_from = now;
            }
            return Action::Wait(None);
        }

        if let Some((opened_at, ends_at)) = state.window.as_ref().map(|w| (w.opened_at, w.ends_at)) {
            let still_open = state.busy == 0 && state.last_activity <= opened_at && now < ends_at;
            if still_open && let Some((id, entry)) = state.queue.pop_first() {
                return Action::Run {
                    id,
                    callback: entry.callback,
                    deadline: window_deadline(ends_at),
                };
            }
            state.window = None;
            state.quiet_from = now;
        }

        let idle_at = state.last_activity.max(state.quiet_from) + self.config.quiet_period;
        if state.busy == 0 && now >= idle_at {
            let full = now + self.config.max_window;
            let ends_at = state
                .queue
                .values()
                .filter_map(|e| e.expires_at)
                .min()
                .map_or(full, |expiry| expiry.min(full));
            state.window = Some(Window {
                opened_at: now,
                ends_at,
            });
            tracing::trace!(pending = state.queue.len(), "Idle window opened");
            if let Some((id, entry)) = state.queue.pop_first() {
                return Action::Run {
                    id,
                    callback: entry.callback,
                    deadline: window_deadline(ends_at),
                };
            }
        }

        let earliest_expiry = state.queue.values().filter_map(|e| e.expires_at).min();
        let idle_wake = (state.busy == 0).then_some(idle_at);
        let wake_at = match (earliest_expiry, idle_wake) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        Action::Wait(wake_at)
    }

    fn touch(&self) {
        self.lock().last_activity = Instant::now();
        self.wake.notify_one();
    }
}

fn tokio_now() -> std::time::Instant {
    Instant::now().into_std()
}

/// Deadline counted against the runtime clock, so paused time stays consistent.
fn window_deadline(ends_at: Instant) -> IdleDeadline {
    IdleDeadline::window_with_clock(ends_at.into_std(), tokio_now)
}

async fn dispatch_loop(shared: Arc<Shared>) {
    loop {
        match shared.next_action(Instant::now()) {
            Action::Closed => return,
            Action::Run {
                id,
                callback,
                deadline,
            } => {
                tracing::trace!(
                    %id,
                    did_timeout = deadline.did_timeout(),
                    "Running idle callback"
                );
                if catch_unwind(AssertUnwindSafe(|| callback(&deadline))).is_err() {
                    tracing::error!(%id, "Idle callback panicked");
                }
                // Let foreground tasks interleave with a long queue.
                tokio::task::yield_now().await;
            }
            Action::Wait(Some(at)) => {
                tokio::select! {
                    () = shared.wake.notified() => {}
                    () = tokio::time::sleep_until(at) => {}
                }
            }
            Action::Wait(None) => shared.wake.notified().await,
        }
    }
}

/// Idle host backed by a dispatch task on a tokio runtime.
///
/// Dropping the dispatcher stops the task and discards queued callbacks.
pub struct IdleDispatcher {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl IdleDispatcher {
    /// Start a dispatcher on `runtime`.
    ///
    /// Returned in an `Arc` so it can be handed to an
    /// [`IdleScheduler`](crate::IdleScheduler) and still be used to report
    /// activity.
    #[must_use]
    pub fn start(runtime: &Handle, config: DispatcherConfig) -> Arc<Self> {
        let now = Instant::now();
        let shared = Arc::new(Shared {
            state: Mutex::new(DispatchState {
                queue: BTreeMap::new(),
                next_id: IdleCallbackId::new(1),
                busy: 0,
                last_activity: now,
                quiet_from: now,
                window: None,
                closed: false,
            }),
            wake: Notify::new(),
            config,
        });
        let task = runtime.spawn(dispatch_loop(Arc::clone(&shared)));
        tracing::debug!(
            quiet_period_ms = config.quiet_period.as_millis() as u64,
            max_window_ms = config.max_window.as_millis() as u64,
            "Idle dispatcher started"
        );
        Arc::new(Self { shared, task })
    }

    /// Mark the host busy until the returned guard is dropped.
    #[must_use = "the host is only busy while the guard is alive"]
    pub fn activity(&self) -> ActivityGuard {
        {
            let mut state = self.shared.lock();
            state.busy += 1;
            state.last_activity = Instant::now();
        }
        self.shared.wake.notify_one();
        ActivityGuard {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Note a burst of foreground work; restarts the quiet period.
    pub fn record_activity(&self) {
        self.shared.touch();
    }

    /// Number of callbacks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shared.lock().closed
    }

    /// Stop dispatching. Queued callbacks are dropped without running.
    pub fn shutdown(&self) {
        let dropped = {
            let mut state = self.shared.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.queue)
        };
        self.shared.wake.notify_one();
        tracing::debug!(dropped = dropped.len(), "Idle dispatcher shut down");
    }
}

impl IdleHost for IdleDispatcher {
    fn request_idle_callback(
        &self,
        callback: IdleCallback,
        timeout: Option<Duration>,
    ) -> IdleCallbackId {
        let id = {
            let mut state = self.shared.lock();
            let id = state.next_id;
            state.next_id = id.next();
            if state.closed {
                tracing::debug!(%id, "Idle dispatcher is shut down; dropping callback");
                return id;
            }
            let expires_at = timeout.map(|timeout| Instant::now() + timeout);
            state.queue.insert(
                id,
                Entry {
                    callback,
                    expires_at,
                },
            );
            id
        };
        self.shared.wake.notify_one();
        id
    }

    fn cancel_idle_callback(&self, id: IdleCallbackId) {
        let removed = self.shared.lock().queue.remove(&id);
        if removed.is_some() {
            tracing::trace!(%id, "Idle callback cancelled");
            self.shared.wake.notify_one();
        }
    }
}

impl Drop for IdleDispatcher {
    fn drop(&mut self) {
        self.shutdown();
        self.task.abort();
    }
}

impl std::fmt::Debug for IdleDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdleDispatcher")
            .field("config", &self.shared.config)
            .field("pending", &self.pending())
            .finish()
    }
}

/// Keeps the host busy while alive.
pub struct ActivityGuard {
    shared: Arc<Shared>,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        {
            let mut state = self.shared.lock();
            state.busy = state.busy.saturating_sub(1);
            state.last_activity = Instant::now();
        }
        self.shared.wake.notify_one();
    }
}
