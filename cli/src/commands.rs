//! Command implementations.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::sync::oneshot;

use lull_core::{IdleRuntime, IdleValue};

/// How long `probe` lets a native host wait before forcing the callback.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

pub fn sha256_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Schedule a digest per file, leave `wait` for idle precomputation, then
/// print every digest, computing the stragglers inline.
///
/// Returns the number of files that failed.
pub async fn digest(runtime: &IdleRuntime, files: &[PathBuf], wait: Duration) -> usize {
    let values: Vec<(&PathBuf, IdleValue<String, io::Error>)> = files
        .iter()
        .map(|path| {
            let target = path.clone();
            let value = IdleValue::new(runtime.scheduler(), move || sha256_file(&target));
            (path, value)
        })
        .collect();

    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }

    let _foreground = runtime.activity();
    let mut failures = 0;
    for (path, value) in &values {
        let source = if value.state().has_run() { "idle" } else { "forced" };
        match value.get_value() {
            Ok(hex) => {
                tracing::info!(path = %path.display(), source, "Digest ready");
                println!("{hex}  {}", path.display());
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), source, "Digest failed: {err}");
                eprintln!("{}: {err}", path.display());
                failures += 1;
            }
        }
    }
    failures
}

/// Print the scheduler strategy and the deadline it hands to a callback.
pub async fn probe(runtime: &IdleRuntime) -> Result<()> {
    let (tx, rx) = oneshot::channel();
    let _handle = runtime.scheduler().run_when_idle(
        move |deadline| {
            let _ = tx.send((deadline.did_timeout(), deadline.time_remaining()));
        },
        Some(PROBE_TIMEOUT),
    );

    let (did_timeout, remaining) = rx.await.context("idle callback was dropped")?;
    println!("scheduler: {}", runtime.scheduler().kind());
    println!("did_timeout: {did_timeout}");
    println!("time_remaining_ms: {remaining:.3}");
    Ok(())
}
