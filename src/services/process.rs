use crate::models::Platform;
use camino::{Utf8Path, Utf8PathBuf};
use std::future::Future;
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

/// Timeout for `fpc -h` when verifying a candidate compiler.
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for `which` / `where` lookups.
pub const LOCATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for `pkill` / `taskkill` when clearing a stale run.
pub const KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors from a single subprocess probe
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {elapsed:?}")]
    Timeout { program: String, elapsed: Duration },

    #[error("{program} exited with code {code}")]
    ExitCode { program: String, code: i32 },
}

/// Subprocess capabilities needed by the compiler locator and the orchestrator.
///
/// Every method carries its own timeout; none of them may hang a job.
pub trait ProcessRunner: Send + Sync {
    /// Resolve `command` through the platform's PATH lookup utility.
    fn locate(&self, command: &str) -> impl Future<Output = Option<Utf8PathBuf>> + Send;

    /// Run `program -h` and return stdout followed by stderr.
    fn help_output(
        &self,
        program: &Utf8Path,
    ) -> impl Future<Output = Result<String, ProbeError>> + Send;

    /// Terminate every running instance of `executable`.
    fn kill_program(
        &self,
        executable: &Utf8Path,
    ) -> impl Future<Output = Result<(), ProbeError>> + Send;
}

/// `pkill -f` pattern matching a process started as `executable`, with or
/// without arguments.
///
/// `pkill -x` compares against the kernel process name, which Linux cuts to
/// 15 characters, so longer program names would never match. The full
/// command line has no such limit.
pub fn command_line_pattern(executable: &Utf8Path) -> String {
    let mut pattern = String::with_capacity(executable.as_str().len() + 8);
    pattern.push('^');
    for c in executable.as_str().chars() {
        if matches!(
            c,
            '.' | '[' | ']' | '(' | ')' | '*' | '+' | '?' | '{' | '}' | '|' | '^' | '$' | '\\'
        ) {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push_str("( |$)");
    pattern
}

/// [`ProcessRunner`] backed by real subprocesses.
#[derive(Debug, Clone, Copy)]
pub struct SystemRunner {
    platform: Platform,
}

impl SystemRunner {
    pub fn new(platform: Platform) -> Self {
        Self { platform }
    }

    /// Run a command to completion with a timeout, capturing its output.
    async fn run_captured(
        &self,
        mut cmd: Command,
        program: &str,
        limit: Duration,
    ) -> Result<std::process::Output, ProbeError> {
        let start = Instant::now();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| ProbeError::Launch {
            program: program.to_string(),
            source,
        })?;

        let output = timeout(limit, child.wait_with_output())
            .await
            .map_err(|_| {
                tracing::warn!("{} timed out after {:?}", program, limit);
                ProbeError::Timeout {
                    program: program.to_string(),
                    elapsed: limit,
                }
            })?
            .map_err(|source| ProbeError::Launch {
                program: program.to_string(),
                source,
            })?;

        tracing::debug!(
            "{} completed in {:.2}s with exit code {:?}",
            program,
            start.elapsed().as_secs_f32(),
            output.status.code()
        );

        Ok(output)
    }
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self::new(Platform::current())
    }
}

impl ProcessRunner for SystemRunner {
    async fn locate(&self, command: &str) -> Option<Utf8PathBuf> {
        let lookup = if self.platform.is_windows() { "where" } else { "which" };
        let mut cmd = Command::new(lookup);
        cmd.arg(command);

        let output = match self.run_captured(cmd, lookup, LOCATE_TIMEOUT).await {
            Ok(output) if output.status.success() => output,
            Ok(_) => return None,
            Err(e) => {
                tracing::debug!("PATH lookup for {} failed: {}", command, e);
                return None;
            }
        };

        first_line(&String::from_utf8_lossy(&output.stdout)).map(Utf8PathBuf::from)
    }

    async fn help_output(&self, program: &Utf8Path) -> Result<String, ProbeError> {
        let mut cmd = Command::new(program.as_std_path());
        cmd.arg("-h");

        let output = self.run_captured(cmd, program.as_str(), VERIFY_TIMEOUT).await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }

    async fn kill_program(&self, executable: &Utf8Path) -> Result<(), ProbeError> {
        let (program, cmd) = if self.platform.is_windows() {
            let image_name = executable.file_name().unwrap_or(executable.as_str());
            let mut cmd = Command::new("taskkill");
            cmd.args(["/F", "/IM", image_name]);
            ("taskkill", cmd)
        } else {
            let mut cmd = Command::new("pkill");
            cmd.arg("-f").arg(command_line_pattern(executable));
            ("pkill", cmd)
        };

        let output = self.run_captured(cmd, program, KILL_TIMEOUT).await?;
        match output.status.code() {
            Some(0) => {
                tracing::info!("Terminated running instance of {}", executable);
                Ok(())
            }
            code => Err(ProbeError::ExitCode {
                program: program.to_string(),
                code: code.unwrap_or(-1),
            }),
        }
    }
}

/// First non-empty, trimmed line of a command's output.
pub fn first_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Whether `path` looks runnable.
///
/// Checks the execute permission bits on Unix and for a regular file on
/// Windows. If the metadata itself cannot be read, falls back to plain
/// existence.
pub fn is_accessible(path: &Utf8Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => meta.is_file() && has_execute_permission(&meta),
        Err(_) => path.exists(),
    }
}

#[cfg(unix)]
fn has_execute_permission(meta: &std::fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn has_execute_permission(_meta: &std::fs::Metadata) -> bool {
    true
}
