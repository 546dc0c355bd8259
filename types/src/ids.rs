use std::fmt;

/// Handle returned by an idle host when a callback is registered.
///
/// Ids are allocated monotonically by the host and never reused, so cancelling
/// a stale id can never hit a newer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdleCallbackId(u64);

impl IdleCallbackId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The id following this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for IdleCallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "idle#{}", self.0)
    }
}
