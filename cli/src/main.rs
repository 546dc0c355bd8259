//! Lull CLI - precompute work on idle time, force it when needed.
//!
//! ```text
//! main() -> init_tracing() -> LullConfig::load() -> IdleSettings::resolve()
//!        -> IdleRuntime::start() -> Command::{Digest, Probe}
//! ```
//!
//! Logs go to `~/.lull/logs/lull.log` (or `./.lull/logs/lull.log`) so they
//! never interleave with command output.

mod commands;

use anyhow::{Result, bail};
use std::{
    env,
    fs::{self, OpenOptions},
    path::PathBuf,
    sync::Mutex,
    time::Duration,
};
use tokio::runtime::Handle;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lull_config::{IdleSettings, LullConfig};
use lull_core::IdleRuntime;

const USAGE: &str = "usage:\n  lull digest [--wait MS] FILE...\n  lull probe";

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::try_new("warn").expect("warn filter is valid"));

    let (log_file, init_warnings) = open_log_file();

    if let Some((log_path, file)) = log_file {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .with(env_filter)
            .init();

        tracing::info!(path = %log_path.display(), "Logging initialized");
        for warning in init_warnings {
            tracing::warn!("{warning}");
        }
        return;
    }

    // `digest` and `probe` print results on stdout; without a log file stay silent.
    tracing_subscriber::registry().with(env_filter).init();
}

fn open_log_file() -> (Option<(PathBuf, std::fs::File)>, Vec<String>) {
    let mut warnings = Vec::new();

    for candidate in log_file_candidates() {
        if let Some(parent) = candidate.parent()
            && let Err(e) = fs::create_dir_all(parent)
        {
            warnings.push(format!(
                "Failed to create log dir {}: {e}",
                parent.display()
            ));
            continue;
        }

        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&candidate)
        {
            Ok(file) => return (Some((candidate, file)), warnings),
            Err(e) => {
                warnings.push(format!(
                    "Failed to open log file {}: {e}",
                    candidate.display()
                ));
            }
        }
    }

    (None, warnings)
}

fn log_file_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    // Primary: ~/.lull/logs/lull.log
    if let Some(config_path) = LullConfig::path()
        && let Some(config_dir) = config_path.parent()
    {
        candidates.push(config_dir.join("logs").join("lull.log"));
    }

    candidates.push(PathBuf::from(".lull").join("logs").join("lull.log"));

    candidates
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Digest { wait: Duration, files: Vec<PathBuf> },
    Probe,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let Some((name, rest)) = args.split_first() else {
            bail!("missing command\n{USAGE}");
        };
        match name.as_str() {
            "digest" => {
                let mut wait = Duration::ZERO;
                let mut files = Vec::new();
                let mut iter = rest.iter();
                while let Some(arg) = iter.next() {
                    if arg == "--wait" {
                        let Some(raw) = iter.next() else {
                            bail!("--wait needs a value in milliseconds\n{USAGE}");
                        };
                        let ms: u64 = raw
                            .parse()
                            .map_err(|_| anyhow::anyhow!("invalid --wait value '{raw}'"))?;
                        wait = Duration::from_millis(ms);
                    } else {
                        files.push(PathBuf::from(arg));
                    }
                }
                if files.is_empty() {
                    bail!("digest needs at least one file\n{USAGE}");
                }
                Ok(Command::Digest { wait, files })
            }
            "probe" => Ok(Command::Probe),
            other => bail!("unknown command '{other}'\n{USAGE}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let config = match LullConfig::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Ignoring config: {err}");
            None
        }
    };
    let settings = IdleSettings::resolve(config.as_ref());
    let runtime = IdleRuntime::start(&settings, &Handle::current());

    match command {
        Command::Digest { wait, files } => {
            let failures = commands::digest(&runtime, &files, wait).await;
            if failures > 0 {
                bail!("{failures} file(s) could not be digested");
            }
        }
        Command::Probe => commands::probe(&runtime).await?,
    }

    Ok(())
}
