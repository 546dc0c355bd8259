//! Idle-time scheduling.
//!
//! [`IdleScheduler`] is built once at startup from the host's capabilities and
//! then passed to whoever needs deferred work. It has two strategies:
//!
//! - **Native idle**: the host exposes an [`IdleHost`]; callbacks are
//!   registered with it and run inside real idle windows.
//! - **Fallback timer**: no idle host; callbacks run after the next turn of the
//!   tokio scheduler with [`IdleDeadline::fallback`] (`did_timeout == true`,
//!   15ms remaining). The timeout hint is ignored on this path.
//!
//! Scheduling never fails. Whatever goes wrong inside a callback is the
//! callback owner's problem.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use lull_types::{IdleCallbackId, IdleDeadline};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;

use crate::host::{HostCapabilities, IdleHost};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("idle scheduling requires a tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerKind {
    NativeIdle,
    FallbackTimer,
}

impl SchedulerKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SchedulerKind::NativeIdle => "native-idle",
            SchedulerKind::FallbackTimer => "fallback-timer",
        }
    }
}

impl fmt::Display for SchedulerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone)]
enum Strategy {
    NativeIdle(Arc<dyn IdleHost>),
    FallbackTimer(Handle),
}

/// Runs callbacks when the host has spare time.
///
/// Cheap to clone; clones share the same strategy.
#[derive(Clone)]
pub struct IdleScheduler {
    strategy: Strategy,
}

impl IdleScheduler {
    /// Pick the strategy from what the host offers.
    #[must_use]
    pub fn detect(capabilities: HostCapabilities) -> Self {
        let scheduler = match capabilities.idle_host {
            Some(host) => Self::native(host),
            None => Self::fallback(capabilities.runtime),
        };
        tracing::debug!(kind = %scheduler.kind(), "Idle scheduler selected");
        scheduler
    }

    /// Fallback scheduler on the current tokio runtime.
    pub fn current() -> Result<Self, SchedulerError> {
        HostCapabilities::current().map(Self::detect)
    }

    #[must_use]
    pub fn native(host: Arc<dyn IdleHost>) -> Self {
        Self {
            strategy: Strategy::NativeIdle(host),
        }
    }

    #[must_use]
    pub fn fallback(runtime: Handle) -> Self {
        Self {
            strategy: Strategy::FallbackTimer(runtime),
        }
    }

    #[must_use]
    pub fn kind(&self) -> SchedulerKind {
        match self.strategy {
            Strategy::NativeIdle(_) => SchedulerKind::NativeIdle,
            Strategy::FallbackTimer(_) => SchedulerKind::FallbackTimer,
        }
    }

    /// Schedule `callback` for the next idle window.
    ///
    /// `timeout` is forwarded to a native idle host as a worst-case delay hint.
    /// The returned handle cancels the callback if it has not started yet.
    pub fn run_when_idle<F>(&self, callback: F, timeout: Option<Duration>) -> CancelHandle
    where
        F: FnOnce(&IdleDeadline) + Send + 'static,
    {
        let target = match &self.strategy {
            Strategy::NativeIdle(host) => {
                let id = host.request_idle_callback(Box::new(callback), timeout);
                tracing::trace!(%id, ?timeout, "Registered idle callback");
                CancelTarget::NativeIdle {
                    host: Arc::clone(host),
                    id,
                }
            }
            Strategy::FallbackTimer(runtime) => {
                let task = runtime.spawn(async move {
                    tokio::task::yield_now().await;
                    callback(&IdleDeadline::fallback());
                });
                CancelTarget::FallbackTimer(task.abort_handle())
            }
        };

        CancelHandle {
            disposed: AtomicBool::new(false),
            target,
        }
    }
}

impl fmt::Debug for IdleScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdleScheduler")
            .field("kind", &self.kind())
            .finish()
    }
}

enum CancelTarget {
    NativeIdle {
        host: Arc<dyn IdleHost>,
        id: IdleCallbackId,
    },
    FallbackTimer(AbortHandle),
}

/// Cancels one scheduled callback.
///
/// Dropping the handle does not cancel anything.
pub struct CancelHandle {
    disposed: AtomicBool,
    target: CancelTarget,
}

impl CancelHandle {
    /// Prevent the callback from running if it has not started.
    ///
    /// Only the first call reaches the host; later calls do nothing.
    pub fn cancel(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        match &self.target {
            CancelTarget::NativeIdle { host, id } => {
                tracing::trace!(%id, "Cancelling idle callback");
                host.cancel_idle_callback(*id);
            }
            CancelTarget::FallbackTimer(task) => task.abort(),
        }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.target {
            CancelTarget::NativeIdle { .. } => SchedulerKind::NativeIdle,
            CancelTarget::FallbackTimer(_) => SchedulerKind::FallbackTimer,
        };
        f.debug_struct("CancelHandle")
            .field("kind", &kind)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
