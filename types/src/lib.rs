//! Core domain types for Lull.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer: the scheduler, the configuration
//! loader, and the binary.

// Pedantic lint configuration - these are intentional design choices
#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod deadline;
mod ids;
mod mode;
mod state;

pub use deadline::{Clock, FALLBACK_TIME_REMAINING_MS, IdleDeadline};
pub use ids::IdleCallbackId;
pub use mode::{ModeParseError, SchedulerMode};
pub use state::IdleValueState;
