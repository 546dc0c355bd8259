//! Host-side idle notification primitives.

use std::sync::Arc;
use std::time::Duration;

use lull_types::{IdleCallbackId, IdleDeadline};
use tokio::runtime::Handle;

use crate::scheduler::SchedulerError;

/// A callback scheduled for idle time. The deadline is only lent for the call.
pub type IdleCallback = Box<dyn FnOnce(&IdleDeadline) + Send + 'static>;

/// A host that can report idle windows: register-for-idle plus cancel-by-handle.
///
/// `timeout` is a hint: if no idle window opens within it, the host should run
/// the callback anyway with a deadline whose `did_timeout()` is true.
pub trait IdleHost: Send + Sync {
    fn request_idle_callback(
        &self,
        callback: IdleCallback,
        timeout: Option<Duration>,
    ) -> IdleCallbackId;

    /// Cancel a registration. Unknown or already-run ids are ignored.
    fn cancel_idle_callback(&self, id: IdleCallbackId);
}

/// What the host offers, probed once at startup.
#[derive(Clone)]
pub struct HostCapabilities {
    pub idle_host: Option<Arc<dyn IdleHost>>,
    pub runtime: Handle,
}

impl HostCapabilities {
    /// Capabilities of the tokio runtime this is called from, without an idle host.
    pub fn current() -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self {
            idle_host: None,
            runtime,
        })
    }

    #[must_use]
    pub fn with_idle_host(mut self, host: Arc<dyn IdleHost>) -> Self {
        self.idle_host = Some(host);
        self
    }
}

impl std::fmt::Debug for HostCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCapabilities")
            .field("idle_host", &self.idle_host.is_some())
            .finish_non_exhaustive()
    }
}
