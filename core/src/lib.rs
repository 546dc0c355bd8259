//! Idle-time scheduling for Lull.
//!
//! - [`IdleScheduler`]: run a callback when the host has spare time, through a
//!   native [`IdleHost`] when one exists or a fallback timer otherwise.
//! - [`IdleValue`]: a value computed on idle time, or synchronously on first
//!   use if idle time has not come yet.
//! - [`IdleDispatcher`]: an [`IdleHost`] for tokio applications that reports
//!   idleness from activity guards.
//! - [`IdleRuntime`]: builds all of the above from [`lull_config::IdleSettings`].

mod dispatcher;
mod host;
mod runtime;
mod scheduler;
mod value;

pub use dispatcher::{ActivityGuard, DispatcherConfig, IdleDispatcher};
pub use host::{HostCapabilities, IdleCallback, IdleHost};
pub use runtime::IdleRuntime;
pub use scheduler::{CancelHandle, IdleScheduler, SchedulerError, SchedulerKind};
pub use value::IdleValue;

pub use lull_types::{IdleCallbackId, IdleDeadline, IdleValueState};
