// State management module
//
// This module provides the StateManager which wraps RunState with thread-safe access
// using Arc<RwLock<T>> and emits change events for progress reporting.

use crate::models::{JobPhase, RunState};
use camino::Utf8PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when state is modified
///
/// Subscribers (the console reporter, tests) receive these instead of polling.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A job acquired the run flag
    JobStarted { source: Utf8PathBuf },

    /// The active job moved to a new phase
    PhaseChanged { phase: JobPhase },

    /// Commands were dispatched to a terminal and the job ended normally
    JobFinished { source: Utf8PathBuf },

    /// The job ended early
    JobAborted { reason: String },

    /// A `run` was refused because another job holds the run flag
    JobRejected,
}

/// Thread-safe state manager with event emission
///
/// Owns the mutual-exclusion flag for compile jobs. A single instance lives
/// inside the orchestrator for the lifetime of the process; nothing else holds
/// job state, so tests can create as many independent managers as they like.
///
/// - [`read()`](Self::read) for reading state
/// - [`update()`](Self::update) for mutations with automatic event emission
/// - [`try_begin_job()`](Self::try_begin_job) to acquire the run flag
/// - [`subscribe()`](Self::subscribe) for listening to state changes
pub struct StateManager {
    state: Arc<RwLock<RunState>>,

    /// Broadcast channel for emitting state change events
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with default state
    ///
    /// # Returns
    /// A new StateManager with a broadcast channel buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(RunState::default())),
            state_tx,
        }
    }

    /// Get a read-only snapshot of the current state
    pub fn snapshot(&self) -> RunState {
        self.state.read().unwrap().clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let busy = state_manager.read(|state| state.is_running());
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&RunState) -> R,
    {
        let state = self.state.read().unwrap();
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, detects what changed and
    /// emits the matching events.
    ///
    /// # Returns
    /// A vector of StateChange events that were emitted
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut RunState),
    {
        let mut state = self.state.write().unwrap();
        let old_state = state.clone();

        update_fn(&mut state);

        let changes = self.detect_changes(&old_state, &state);

        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(&self, old: &RunState, new: &RunState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if !old.is_running() && new.is_running() {
            if let Some(source) = &new.current_source {
                changes.push(StateChange::JobStarted {
                    source: source.clone(),
                });
            }
        }

        if old.phase != new.phase {
            changes.push(StateChange::PhaseChanged { phase: new.phase });
        }

        if new.jobs_dispatched > old.jobs_dispatched {
            if let Some(source) = &old.current_source {
                changes.push(StateChange::JobFinished {
                    source: source.clone(),
                });
            }
        }

        if new.jobs_aborted > old.jobs_aborted {
            changes.push(StateChange::JobAborted {
                reason: new.last_abort_reason.clone().unwrap_or_default(),
            });
        }

        changes
    }

    /// Atomically check and set the run flag.
    ///
    /// Returns `None` (and emits [`StateChange::JobRejected`]) if a job is
    /// already active; the active job's state is left untouched. Otherwise
    /// moves to [`JobPhase::Validating`] and returns a guard that puts the
    /// state back to idle when dropped, whatever path the job takes out.
    pub fn try_begin_job(&self, source: Utf8PathBuf) -> Option<JobGuard<'_>> {
        let mut state = self.state.write().unwrap();
        if state.is_running() {
            drop(state);
            tracing::warn!("Rejected run request: a compile job is already active");
            let _ = self.state_tx.send(StateChange::JobRejected);
            return None;
        }

        let old_state = state.clone();
        state.phase = JobPhase::Validating;
        state.current_source = Some(source);
        let changes = self.detect_changes(&old_state, &state);
        drop(state);

        for change in changes {
            let _ = self.state_tx.send(change);
        }

        Some(JobGuard {
            manager: self,
            finished: false,
        })
    }

    /// Whether a job currently holds the run flag
    pub fn is_running(&self) -> bool {
        self.read(|s| s.is_running())
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the run flag for one job.
///
/// Dropping the guard without calling [`finish`](Self::finish) or
/// [`abort`](Self::abort) still resets the flag, so an early return or panic
/// can never leave the orchestrator stuck in a busy state.
pub struct JobGuard<'a> {
    manager: &'a StateManager,
    finished: bool,
}

impl JobGuard<'_> {
    /// Move the job to a new phase
    pub fn advance(&self, phase: JobPhase) {
        self.manager.update(|state| state.phase = phase);
    }

    /// Record the compiler the job will use
    pub fn set_compiler(&self, compiler: Utf8PathBuf) {
        self.manager
            .update(|state| state.current_compiler = Some(compiler));
    }

    /// End the job normally, after its commands were dispatched
    pub fn finish(mut self) {
        self.finished = true;
        self.manager.update(|state| {
            state.jobs_dispatched += 1;
            state.reset_job();
        });
    }

    /// End the job early with a reason
    pub fn abort(mut self, reason: impl Into<String>) {
        self.finished = true;
        let reason = reason.into();
        self.manager.update(|state| {
            state.jobs_aborted += 1;
            state.last_abort_reason = Some(reason);
            state.reset_job();
        });
    }
}

impl Drop for JobGuard<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        // Never panic in drop, even with a poisoned lock
        if let Ok(mut state) = self.manager.state.write() {
            state.jobs_aborted += 1;
            state.last_abort_reason = Some("job ended unexpectedly".to_string());
            state.reset_job();
        }
        let _ = self.manager.state_tx.send(StateChange::JobAborted {
            reason: "job ended unexpectedly".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_job_sets_flag() {
        let manager = StateManager::new();
        let guard = manager.try_begin_job(Utf8PathBuf::from("/tmp/a.pas")).unwrap();

        assert!(manager.is_running());
        assert_eq!(manager.read(|s| s.phase), JobPhase::Validating);

        guard.finish();
        assert!(!manager.is_running());
        assert_eq!(manager.read(|s| s.jobs_dispatched), 1);
    }

    #[test]
    fn test_second_job_rejected_without_touching_first() {
        let manager = StateManager::new();
        let guard = manager.try_begin_job(Utf8PathBuf::from("/tmp/a.pas")).unwrap();
        guard.advance(JobPhase::ResolvingCompiler);

        assert!(manager.try_begin_job(Utf8PathBuf::from("/tmp/b.pas")).is_none());

        let state = manager.snapshot();
        assert_eq!(state.phase, JobPhase::ResolvingCompiler);
        assert_eq!(state.current_source, Some(Utf8PathBuf::from("/tmp/a.pas")));
        drop(guard);
    }

    #[test]
    fn test_dropped_guard_releases_flag() {
        let manager = StateManager::new();
        {
            let _guard = manager.try_begin_job(Utf8PathBuf::from("/tmp/a.pas")).unwrap();
        }
        assert!(!manager.is_running());
        assert_eq!(manager.read(|s| s.jobs_aborted), 1);
        assert!(manager.try_begin_job(Utf8PathBuf::from("/tmp/a.pas")).is_some());
    }

    #[test]
    fn test_abort_records_reason() {
        let manager = StateManager::new();
        let guard = manager.try_begin_job(Utf8PathBuf::from("/tmp/a.pas")).unwrap();
        guard.abort("No compiler available");

        let state = manager.snapshot();
        assert!(!state.is_running());
        assert_eq!(state.last_abort_reason.as_deref(), Some("No compiler available"));
    }

    #[test]
    fn test_detect_phase_change() {
        let manager = StateManager::new();
        let changes = manager.update(|s| s.phase = JobPhase::Preparing);
        assert_eq!(
            changes,
            vec![StateChange::PhaseChanged {
                phase: JobPhase::Preparing
            }]
        );
    }

    #[test]
    fn test_no_changes_no_events() {
        let manager = StateManager::new();
        let changes = manager.update(|_| {});
        assert!(changes.is_empty());
    }
}
