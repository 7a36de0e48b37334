//! Files the compiler leaves behind: the previous executable and the
//! intermediate object/unit files.

use crate::models::{CompileJob, SourceFile};
use crate::services::best_effort::BestEffort;
use crate::services::command_builder::{HANDLE_RELEASE_DELAY, STALE_EXECUTABLE_RETRY};
use crate::services::process::ProcessRunner;
use crate::services::retry::RetryPolicy;
use camino::{Utf8Path, Utf8PathBuf};
use std::io::ErrorKind;
use std::time::Duration;

/// Intermediate files produced next to the source, keyed by base name.
pub const ARTIFACT_EXTENSIONS: [&str; 3] = [".o", ".ppu", ".compiled"];

/// How long to wait after dispatch before deleting intermediate files.
pub const CLEANUP_DELAY: Duration = Duration::from_secs(2);

/// Outcome of one cleanup pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub removed: Vec<Utf8PathBuf>,
    pub failed: Vec<(Utf8PathBuf, String)>,
}

impl CleanupReport {
    /// Nothing was deleted and nothing failed.
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.failed.is_empty()
    }
}

/// Artifact paths for `source`: `<dir>/<base>.o`, `.ppu`, `.compiled`.
pub fn artifact_paths(source: &SourceFile) -> Vec<Utf8PathBuf> {
    let directory = source.directory();
    let base = source.base_name();
    ARTIFACT_EXTENSIONS
        .iter()
        .map(|ext| directory.join(format!("{base}{ext}")))
        .collect()
}

/// Delete the intermediate files of `source` that exist.
///
/// Missing files are neither deletions nor failures, so repeated calls are
/// harmless. Failures are logged and reported, never returned as errors.
pub async fn cleanup_artifacts(source: &SourceFile) -> CleanupReport {
    let mut report = CleanupReport::default();

    for path in artifact_paths(source) {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!("Cleaned up: {}", path);
                report.removed.push(path);
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Failed to delete {}: {}", path, e);
                report.failed.push((path, e.to_string()));
            }
        }
    }

    report
}

/// Delete `path` if present, retrying while the OS still holds it.
///
/// Returns `true` when a file was actually removed.
pub async fn remove_stale_executable(path: &Utf8Path, policy: RetryPolicy) -> std::io::Result<bool> {
    policy
        .retry(|attempt| async move {
            match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
                Err(e) => {
                    tracing::debug!("Attempt {} to delete {} failed: {}", attempt, path, e);
                    Err(e)
                }
            }
        })
        .await
}

/// Stop a previous run of the program and remove its executable.
///
/// Some compilers refuse to overwrite an executable that is still running.
/// Every step here is best-effort: a failure leaves the compile to report the
/// real problem.
pub async fn clear_stale_run<R: ProcessRunner>(runner: &R, job: &CompileJob) {
    if BestEffort::quiet("Stopping previous run", runner.kill_program(&job.executable).await).is_some() {
        tokio::time::sleep(HANDLE_RELEASE_DELAY).await;
    }

    match BestEffort::log(
        "Removing previous executable",
        remove_stale_executable(&job.executable, STALE_EXECUTABLE_RETRY).await,
    ) {
        Some(true) => tracing::info!("Removed previous executable: {}", job.executable),
        Some(false) => tracing::debug!("No previous executable at {}", job.executable),
        None => {}
    }
}
