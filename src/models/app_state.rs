use camino::Utf8PathBuf;
use std::fmt;

/// Maximum number of compile jobs that may be in flight at once.
///
/// A second `run` while one is active is rejected outright rather than queued.
/// Enforced by [`crate::state::StateManager::try_begin_job`].
pub const MAX_CONCURRENT_JOBS: usize = 1;

/// Phases of a single compile job.
///
/// `Idle -> Validating -> ResolvingCompiler -> Preparing -> Running -> Idle`.
/// An aborted job returns straight to `Idle`; the abort itself is reported as a
/// [`crate::state::StateChange::JobAborted`] event rather than a resting phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobPhase {
    #[default]
    Idle,
    Validating,
    ResolvingCompiler,
    Preparing,
    Running,
}

impl JobPhase {
    pub fn is_active(&self) -> bool {
        !matches!(self, JobPhase::Idle)
    }

    pub fn description(&self) -> &'static str {
        match self {
            JobPhase::Idle => "Idle",
            JobPhase::Validating => "Validating source file",
            JobPhase::ResolvingCompiler => "Resolving compiler",
            JobPhase::Preparing => "Preparing executable",
            JobPhase::Running => "Sending commands to terminal",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Process-lifetime state of the orchestrator.
///
/// Wrapped by [`crate::state::StateManager`]; never mutate it directly.
#[derive(Clone, Debug, Default)]
pub struct RunState {
    pub phase: JobPhase,
    pub current_source: Option<Utf8PathBuf>,
    pub current_compiler: Option<Utf8PathBuf>,

    // Counters for the lifetime of the process
    pub jobs_dispatched: usize,
    pub jobs_aborted: usize,
    pub last_abort_reason: Option<String>,
}

impl RunState {
    /// The mutual-exclusion flag: true while any job is between start and end.
    pub fn is_running(&self) -> bool {
        self.phase.is_active()
    }

    /// Reset per-job fields back to idle.
    pub fn reset_job(&mut self) {
        self.phase = JobPhase::Idle;
        self.current_source = None;
        self.current_compiler = None;
    }

    /// Short status line for the console.
    pub fn status_message(&self) -> String {
        match (&self.phase, &self.current_source) {
            (JobPhase::Idle, _) if self.jobs_dispatched == 0 && self.jobs_aborted == 0 => {
                "Ready".to_string()
            }
            (JobPhase::Idle, _) => format!(
                "Ready ({} dispatched, {} aborted)",
                self.jobs_dispatched, self.jobs_aborted
            ),
            (phase, Some(source)) => format!("{}: {}", phase, source),
            (phase, None) => phase.to_string(),
        }
    }
}
