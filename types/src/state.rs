use std::fmt;

/// Lifecycle of an idle value.
///
/// `Pending` and `Disposed` both mean the producer has not run yet; once it
/// runs the value is `Completed` or `Failed` for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdleValueState {
    Pending,
    Completed,
    Failed,
    Disposed,
}

impl IdleValueState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            IdleValueState::Pending => "pending",
            IdleValueState::Completed => "completed",
            IdleValueState::Failed => "failed",
            IdleValueState::Disposed => "disposed",
        }
    }

    /// Whether the producer has already run.
    #[must_use]
    pub const fn has_run(self) -> bool {
        matches!(self, IdleValueState::Completed | IdleValueState::Failed)
    }
}

impl fmt::Display for IdleValueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
