//! Configuration loading for Lull.
//!
//! Configuration lives in `~/.lull/config.toml`. A missing file is not an
//! error: every setting has a default, and [`IdleSettings::resolve`] folds the
//! optional file and the environment into concrete values.

use serde::Deserialize;
use std::{env, fmt, path::Path, path::PathBuf, time::Duration};

use lull_types::SchedulerMode;

/// Environment variable overriding `[idle] mode`.
pub const MODE_ENV_VAR: &str = "LULL_IDLE_MODE";

const DEFAULT_QUIET_PERIOD_MS: u64 = 16;
/// Browsers cap a single idle period at 50ms; same here.
const DEFAULT_MAX_WINDOW_MS: u64 = 50;

#[derive(Debug, Default, Deserialize)]
pub struct LullConfig {
    pub idle: Option<IdleConfig>,
}

#[derive(Debug, Default, Deserialize)]
pub struct IdleConfig {
    /// Scheduling strategy: `auto`, `native` or `fallback`.
    pub mode: Option<SchedulerMode>,
    /// How long the host must stay quiet before an idle window opens.
    pub quiet_period_ms: Option<u64>,
    /// Upper bound on the length of one idle window.
    pub max_window_ms: Option<u64>,
}

#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config at {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config at {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
        }
    }
}

impl LullConfig {
    pub fn load() -> Result<Option<Self>, ConfigError> {
        let path = match config_path() {
            Some(path) => path,
            None => return Ok(None),
        };
        Self::load_from(&path)
    }

    /// Load from an explicit path. A missing file yields `Ok(None)`.
    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }
}

pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".lull").join("config.toml"))
}

/// Idle scheduling settings with every default applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleSettings {
    pub mode: SchedulerMode,
    pub quiet_period: Duration,
    pub max_window: Duration,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            mode: SchedulerMode::Auto,
            quiet_period: Duration::from_millis(DEFAULT_QUIET_PERIOD_MS),
            max_window: Duration::from_millis(DEFAULT_MAX_WINDOW_MS),
        }
    }
}

impl IdleSettings {
    /// Resolve settings from an optional config and the process environment.
    #[must_use]
    pub fn resolve(config: Option<&LullConfig>) -> Self {
        let env_mode = env::var(MODE_ENV_VAR).ok();
        Self::resolve_with(config, env_mode.as_deref())
    }

    /// Resolve with an explicit environment override (`LULL_IDLE_MODE` value).
    ///
    /// Unrecognized override values are logged and ignored.
    #[must_use]
    pub fn resolve_with(config: Option<&LullConfig>, env_mode: Option<&str>) -> Self {
        let defaults = Self::default();
        let idle = config.and_then(|cfg| cfg.idle.as_ref());

        let file_mode = idle.and_then(|idle| idle.mode);
        let env_mode = env_mode.and_then(|raw| match SchedulerMode::parse(raw) {
            Ok(mode) => Some(mode),
            Err(err) => {
                tracing::warn!("Ignoring {MODE_ENV_VAR}: {err}");
                None
            }
        });

        let quiet_period = idle
            .and_then(|idle| idle.quiet_period_ms)
            .map_or(defaults.quiet_period, Duration::from_millis);
        let max_window = idle
            .and_then(|idle| idle.max_window_ms)
            .filter(|ms| *ms > 0)
            .map_or(defaults.max_window, Duration::from_millis);

        Self {
            mode: env_mode.or(file_mode).unwrap_or(defaults.mode),
            quiet_period,
            max_window,
        }
    }
}
