//! Startup wiring: settings in, scheduler out.

use std::sync::Arc;

use lull_config::IdleSettings;
use tokio::runtime::Handle;

use crate::dispatcher::{ActivityGuard, DispatcherConfig, IdleDispatcher};
use crate::host::HostCapabilities;
use crate::scheduler::{IdleScheduler, SchedulerError};

/// The scheduler chosen for this process, plus the idle host backing it when
/// one was started.
#[derive(Debug)]
pub struct IdleRuntime {
    scheduler: IdleScheduler,
    dispatcher: Option<Arc<IdleDispatcher>>,
}

impl IdleRuntime {
    /// Build the scheduler for `settings` on `runtime`.
    ///
    /// `auto` and `native` start an [`IdleDispatcher`]; `fallback` does not.
    #[must_use]
    pub fn start(settings: &IdleSettings, runtime: &Handle) -> Self {
        let dispatcher = settings
            .mode
            .wants_native()
            .then(|| IdleDispatcher::start(runtime, DispatcherConfig::from(settings)));

        let mut capabilities = HostCapabilities {
            idle_host: None,
            runtime: runtime.clone(),
        };
        if let Some(dispatcher) = &dispatcher {
            capabilities = capabilities.with_idle_host(dispatcher.clone());
        }

        let scheduler = IdleScheduler::detect(capabilities);
        tracing::info!(mode = %settings.mode, kind = %scheduler.kind(), "Idle runtime ready");
        Self {
            scheduler,
            dispatcher,
        }
    }

    /// [`IdleRuntime::start`] on the tokio runtime this is called from.
    pub fn current(settings: &IdleSettings) -> Result<Self, SchedulerError> {
        let runtime = Handle::try_current().map_err(|_| SchedulerError::NoRuntime)?;
        Ok(Self::start(settings, &runtime))
    }

    #[must_use]
    pub fn scheduler(&self) -> &IdleScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn dispatcher(&self) -> Option<&Arc<IdleDispatcher>> {
        self.dispatcher.as_ref()
    }

    /// Mark the host busy, if there is an idle host to tell.
    #[must_use = "the host is only busy while the guard is alive"]
    pub fn activity(&self) -> Option<ActivityGuard> {
        self.dispatcher.as_ref().map(|dispatcher| dispatcher.activity())
    }
}
