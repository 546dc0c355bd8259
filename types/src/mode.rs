//! Scheduler strategy selection as it appears in configuration.

use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MODE_PARSE_VALUES: &[&str] = &["auto", "native", "idle", "fallback", "timer"];

/// Which scheduling strategy the host should use.
///
/// `Auto` picks the native idle host whenever one is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SchedulerMode {
    #[default]
    Auto,
    Native,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid scheduler mode '{raw}'; expected one of: {expected:?}")]
pub struct ModeParseError {
    raw: String,
    expected: &'static [&'static str],
}

impl ModeParseError {
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl SchedulerMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            SchedulerMode::Auto => "auto",
            SchedulerMode::Native => "native",
            SchedulerMode::Fallback => "fallback",
        }
    }

    pub fn parse(raw: &str) -> Result<Self, ModeParseError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SchedulerMode::Auto),
            "native" | "idle" => Ok(SchedulerMode::Native),
            "fallback" | "timer" => Ok(SchedulerMode::Fallback),
            _ => Err(ModeParseError {
                raw: raw.to_string(),
                expected: MODE_PARSE_VALUES,
            }),
        }
    }

    /// Whether a native idle host should be started for this mode.
    #[must_use]
    pub const fn wants_native(self) -> bool {
        matches!(self, SchedulerMode::Auto | SchedulerMode::Native)
    }
}

impl FromStr for SchedulerMode {
    type Err = ModeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SchedulerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SchedulerMode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SchedulerMode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        SchedulerMode::parse(&raw).map_err(D::Error::custom)
    }
}
