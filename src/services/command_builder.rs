//! Shell instructions that compile, verify, run and optionally pause.
//!
//! Everything here is a pure function of its inputs. Paths are quoted for the
//! target shell; compiler options are inserted as-is because they are flags.
//! Quoting stops word splitting and variable expansion in ordinary file names.
//! It does not sanitize arbitrary input.

use crate::models::{CompileJob, Platform};
use crate::services::process::command_line_pattern;
use crate::services::retry::RetryPolicy;
use camino::Utf8Path;
use std::time::Duration;

/// Retry schedule for deleting a stale executable that may still be locked.
///
/// Used by the orchestrator directly and rendered into the generated script.
pub const STALE_EXECUTABLE_RETRY: RetryPolicy =
    RetryPolicy::linear(3, Duration::from_millis(200));

/// Pause after killing a stale process so the OS can release the file handle.
pub const HANDLE_RELEASE_DELAY: Duration = Duration::from_millis(300);

/// Shell dialect of the terminal receiving the instructions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellDialect {
    PowerShell,
    Bash,
}

impl ShellDialect {
    pub fn for_platform(platform: Platform) -> Self {
        if platform.is_windows() {
            ShellDialect::PowerShell
        } else {
            ShellDialect::Bash
        }
    }

    /// Quote a path for safe interpolation.
    ///
    /// PowerShell: single quotes, embedded `'` doubled.
    /// Bash: double quotes, with `"`, `` ` ``, `$` and `\` backslash-escaped.
    pub fn escape(&self, value: &str) -> String {
        match self {
            ShellDialect::PowerShell => format!("'{}'", value.replace('\'', "''")),
            ShellDialect::Bash => {
                let mut quoted = String::with_capacity(value.len() + 2);
                quoted.push('"');
                for c in value.chars() {
                    if matches!(c, '"' | '`' | '$' | '\\') {
                        quoted.push('\\');
                    }
                    quoted.push(c);
                }
                quoted.push('"');
                quoted
            }
        }
    }
}

/// Inputs of [`build_instructions`]
#[derive(Debug, Clone, Copy)]
pub struct ScriptRequest<'a> {
    pub compiler: &'a Utf8Path,
    pub options: &'a str,
    pub source: &'a Utf8Path,
    pub executable: &'a Utf8Path,
    pub pause_after_run: bool,
    pub platform: Platform,
}

impl<'a> ScriptRequest<'a> {
    pub fn from_job(job: &'a CompileJob) -> Self {
        Self {
            compiler: &job.compiler,
            options: &job.options,
            source: &job.source.path,
            executable: &job.executable,
            pause_after_run: job.pause_after_run,
            platform: job.platform,
        }
    }
}

/// Ordered shell instructions for one job, in a given dialect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellScript {
    pub dialect: ShellDialect,
    pub lines: Vec<String>,
}

impl ShellScript {
    /// Text to type into an interactive terminal.
    ///
    /// Bash accepts the lines one by one. PowerShell cannot continue an
    /// `if { } else { }` across separately entered lines, so its lines are
    /// joined into a single script block invocation.
    pub fn terminal_input(&self) -> Vec<String> {
        match self.dialect {
            ShellDialect::Bash => self.lines.clone(),
            ShellDialect::PowerShell => vec![format!(
                "Invoke-Command -ScriptBlock {{ {} }}",
                self.lines.join("; ")
            )],
        }
    }

    /// The whole script as one newline-separated string.
    pub fn to_script(&self) -> String {
        let mut script = self.lines.join("\n");
        script.push('\n');
        script
    }
}

/// Build the instruction sequence for the request's platform.
pub fn build_instructions(request: &ScriptRequest<'_>) -> ShellScript {
    let dialect = ShellDialect::for_platform(request.platform);
    let lines = match dialect {
        ShellDialect::Bash => bash_lines(request),
        ShellDialect::PowerShell => powershell_lines(request),
    };
    ShellScript { dialect, lines }
}

/// Join command parts, skipping empty ones (e.g. no compiler options).
fn command_line(parts: &[&str]) -> String {
    parts
        .iter()
        .copied()
        .filter(|part| !part.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn process_name(executable: &Utf8Path) -> &str {
    executable.file_stem().unwrap_or(executable.as_str())
}

fn seconds(duration: Duration) -> String {
    format!("{:.1}", duration.as_secs_f64())
}

fn bash_lines(request: &ScriptRequest<'_>) -> Vec<String> {
    let sh = ShellDialect::Bash;
    let compiler = sh.escape(request.compiler.as_str());
    let source = sh.escape(request.source.as_str());
    let exe = sh.escape(request.executable.as_str());
    let pattern = sh.escape(&command_line_pattern(request.executable));
    let delays = STALE_EXECUTABLE_RETRY
        .delays()
        .map(seconds)
        .collect::<Vec<_>>()
        .join(" ");

    let mut lines = vec![
        "clear".to_string(),
        format!("pkill -f {pattern} 2>/dev/null && sleep {}", seconds(HANDLE_RELEASE_DELAY)),
        format!(
            "for PAR_DELAY in {delays} 0; do [ -e {exe} ] || break; rm -f {exe} 2>/dev/null; [ -e {exe} ] || break; sleep $PAR_DELAY; done"
        ),
        format!(
            "[ -e {exe} ] && echo \"=== Warning: could not remove the previous executable ===\""
        ),
        "echo \"=== Compiling Pascal program ===\"".to_string(),
        command_line(&[&compiler, request.options, &source]),
        "EXIT_CODE=$?".to_string(),
        "if [ $EXIT_CODE -eq 0 ]; then".to_string(),
        format!("  if [ -f {exe} ]; then"),
        "    echo \"\"".to_string(),
        "    echo \"=== Compilation successful! Running program ===\"".to_string(),
        "    echo \"\"".to_string(),
        format!("    chmod +x {exe}"),
        format!("    {exe}"),
        "    PROGRAM_EXIT=$?".to_string(),
        "    echo \"\"".to_string(),
        "    echo \"=== Program exited with code: $PROGRAM_EXIT ===\"".to_string(),
        "  else".to_string(),
        "    echo \"\"".to_string(),
        "    echo \"=== Compilation finished but the executable was not created ===\"".to_string(),
        "  fi".to_string(),
        "else".to_string(),
        "  echo \"\"".to_string(),
        "  echo \"=== Compilation failed! ===\"".to_string(),
        "  echo \"Exit code: $EXIT_CODE\"".to_string(),
        "fi".to_string(),
    ];

    if request.pause_after_run {
        lines.push("echo \"\"".to_string());
        lines.push("read -p \"Press Enter to continue...\" -r".to_string());
    }

    lines
}

fn powershell_lines(request: &ScriptRequest<'_>) -> Vec<String> {
    let ps = ShellDialect::PowerShell;
    let compiler = ps.escape(request.compiler.as_str());
    let source = ps.escape(request.source.as_str());
    let exe = ps.escape(request.executable.as_str());
    let name = ps.escape(process_name(request.executable));
    let delays = STALE_EXECUTABLE_RETRY
        .delays()
        .map(|d| d.as_millis().to_string())
        .collect::<Vec<_>>()
        .join(",");

    let mut lines = vec![
        "cls".to_string(),
        format!(
            "if (Get-Process -Name {name} -ErrorAction SilentlyContinue) {{ Stop-Process -Name {name} -Force -ErrorAction SilentlyContinue; Start-Sleep -Milliseconds {} }}",
            HANDLE_RELEASE_DELAY.as_millis()
        ),
        format!(
            "foreach ($parDelay in @({delays},0)) {{ if (-not (Test-Path -LiteralPath {exe})) {{ break }}; Remove-Item -LiteralPath {exe} -Force -ErrorAction SilentlyContinue; if (-not (Test-Path -LiteralPath {exe})) {{ break }}; Start-Sleep -Milliseconds $parDelay }}"
        ),
        format!(
            "if (Test-Path -LiteralPath {exe}) {{ Write-Host 'Warning: could not remove the previous executable' -ForegroundColor Yellow }}"
        ),
        "Write-Host 'Compiling Pascal program...' -ForegroundColor Cyan".to_string(),
        format!("& {}", command_line(&[&compiler, request.options, &source])),
        "$parExitCode = $LASTEXITCODE".to_string(),
        "if ($LASTEXITCODE -eq 0) {".to_string(),
        format!("  if (Test-Path -LiteralPath {exe}) {{"),
        "    Write-Host ''".to_string(),
        "    Write-Host 'Compilation successful! Running...' -ForegroundColor Green".to_string(),
        "    Write-Host ''".to_string(),
        format!("    & {exe}"),
        "    Write-Host ''".to_string(),
        "    Write-Host \"Program exited with code: $LASTEXITCODE\"".to_string(),
        "  } else {".to_string(),
        "    Write-Host ''".to_string(),
        "    Write-Host 'Compilation finished but the executable was not created' -ForegroundColor Red"
            .to_string(),
        "  }".to_string(),
        "} else {".to_string(),
        "  Write-Host ''".to_string(),
        "  Write-Host 'Compilation failed!' -ForegroundColor Red".to_string(),
        "  Write-Host \"Exit code: $parExitCode\"".to_string(),
        "}".to_string(),
    ];

    if request.pause_after_run {
        lines.push("Write-Host ''".to_string());
        lines.push("Write-Host 'Press any key to continue...' -ForegroundColor Yellow".to_string());
        lines.push("$null = $Host.UI.RawUI.ReadKey('NoEcho,IncludeKeyDown')".to_string());
    }

    lines
}
