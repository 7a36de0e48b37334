// Terminal host - runs dispatched instructions in a real shell
//
// A ShellTerminal collects the lines it is sent and, on flush, starts one
// shell process (bash, or PowerShell on Windows) in the session's working
// directory with the console's stdio. The host keeps every started process so
// the caller can wait for them before exiting.

use super::{Terminal, TerminalHost, TerminalOptions};
use crate::services::command_builder::ShellDialect;
use anyhow::{Context, Result};
use camino::Utf8Path;
use colored::*;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};

/// A started shell and the session it belongs to
struct Session {
    name: String,
    child: Child,
}

/// [`TerminalHost`] that spawns local shells.
#[derive(Clone, Default)]
pub struct ShellTerminalHost {
    sessions: Arc<Mutex<Vec<Session>>>,
}

impl ShellTerminalHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of shells started and not yet waited for.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// Wait for every started shell to exit, in start order.
    pub async fn wait_for_sessions(&self) -> Vec<std::io::Result<ExitStatus>> {
        let sessions = match self.sessions.lock() {
            Ok(mut sessions) => std::mem::take(&mut *sessions),
            Err(_) => Vec::new(),
        };

        let mut statuses = Vec::with_capacity(sessions.len());
        for mut session in sessions {
            let name = session.name.clone();
            let status = tokio::task::spawn_blocking(move || session.child.wait())
                .await
                .unwrap_or_else(|e| Err(std::io::Error::other(e)));

            match &status {
                Ok(status) => tracing::info!("Terminal '{}' exited with {}", name, status),
                Err(e) => tracing::warn!("Failed to wait for terminal '{}': {}", name, e),
            }
            statuses.push(status);
        }
        statuses
    }
}

impl TerminalHost for ShellTerminalHost {
    fn create_terminal(&self, options: &TerminalOptions) -> Result<Box<dyn Terminal>> {
        if !options.cwd.is_dir() {
            anyhow::bail!("Terminal working directory does not exist: {}", options.cwd);
        }

        tracing::debug!(
            "Creating terminal '{}' ({:?}) in {}",
            options.name,
            options.dialect,
            options.cwd
        );
        Ok(Box::new(ShellTerminal {
            options: options.clone(),
            pending: Vec::new(),
            sessions: Arc::clone(&self.sessions),
        }))
    }
}

/// One terminal session created by [`ShellTerminalHost`].
pub struct ShellTerminal {
    options: TerminalOptions,
    pending: Vec<String>,
    sessions: Arc<Mutex<Vec<Session>>>,
}

impl Terminal for ShellTerminal {
    fn show(&mut self) {
        println!("{} {}", "▶".cyan(), self.options.name.bold());
    }

    fn send_text(&mut self, text: &str) -> Result<()> {
        self.pending.push(text.to_string());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let script = join_lines(self.options.dialect, &self.pending);
        let mut cmd = shell_command(self.options.dialect, &script, &self.options.cwd);
        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to start shell for terminal '{}'", self.options.name))?;
        tracing::debug!("Terminal '{}' started (pid {})", self.options.name, child.id());

        self.pending.clear();
        let mut sessions = self
            .sessions
            .lock()
            .map_err(|_| anyhow::anyhow!("Terminal session list is poisoned"))?;
        sessions.push(Session {
            name: self.options.name.clone(),
            child,
        });
        Ok(())
    }
}

/// Statement separator for running several sent lines as one script.
fn join_lines(dialect: ShellDialect, lines: &[String]) -> String {
    match dialect {
        ShellDialect::Bash => lines.join("\n"),
        ShellDialect::PowerShell => lines.join("; "),
    }
}

/// Command that runs `script` in `dialect` with the console's stdio.
fn shell_command(dialect: ShellDialect, script: &str, cwd: &Utf8Path) -> Command {
    let mut cmd = match dialect {
        ShellDialect::Bash => {
            let mut cmd = Command::new("bash");
            cmd.args(["-c", script]);
            cmd
        }
        ShellDialect::PowerShell => {
            let mut cmd = Command::new("powershell.exe");
            cmd.args(["-NoLogo", "-NoProfile", "-Command", script]);
            cmd
        }
    };
    cmd.current_dir(cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;

    #[test]
    fn test_bash_command_shape() {
        let cmd = shell_command(ShellDialect::Bash, "echo hi", Utf8Path::new("/tmp"));
        assert_eq!(cmd.get_program(), "bash");
        let args: Vec<_> = cmd.get_args().collect();
        assert_eq!(args, vec!["-c", "echo hi"]);
        assert_eq!(cmd.get_current_dir(), Some(std::path::Path::new("/tmp")));
    }

    #[test]
    fn test_powershell_command_shape() {
        let cmd = shell_command(ShellDialect::PowerShell, "cls", Utf8Path::new("C:\\work"));
        assert_eq!(cmd.get_program(), "powershell.exe");
        assert_eq!(cmd.get_args().last(), Some(std::ffi::OsStr::new("cls")));
    }

    #[test]
    fn test_join_lines_per_dialect() {
        let lines = vec!["a".to_string(), "b".to_string()];
        assert_eq!(join_lines(ShellDialect::Bash, &lines), "a\nb");
        assert_eq!(join_lines(ShellDialect::PowerShell, &lines), "a; b");
    }

    #[test]
    fn test_missing_cwd_is_rejected() {
        let host = ShellTerminalHost::new();
        let options = TerminalOptions {
            name: "test".to_string(),
            cwd: Utf8PathBuf::from("/definitely/not/here"),
            dialect: ShellDialect::Bash,
        };
        assert!(host.create_terminal(&options).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_flush_runs_lines_in_cwd() {
        let dir = tempfile::TempDir::new().unwrap();
        let cwd = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let host = ShellTerminalHost::new();

        let mut terminal = host
            .create_terminal(&TerminalOptions {
                name: "test".to_string(),
                cwd: cwd.clone(),
                dialect: ShellDialect::Bash,
            })
            .unwrap();
        terminal.send_text("X=ran").unwrap();
        terminal.send_text("echo $X > marker.txt").unwrap();
        terminal.flush().unwrap();
        assert_eq!(host.session_count(), 1);

        let statuses = host.wait_for_sessions().await;
        assert!(statuses[0].as_ref().unwrap().success());
        assert_eq!(std::fs::read_to_string(cwd.join("marker.txt")).unwrap(), "ran\n");
        assert_eq!(host.session_count(), 0);
    }
}
