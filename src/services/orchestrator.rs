//! The compile-and-run workflow.
//!
//! One [`RunOrchestrator`] lives for the whole process and owns the run flag
//! (through its [`StateManager`]). A job moves through
//! `Idle -> Validating -> ResolvingCompiler -> Preparing -> Running -> Idle`
//! and can abort from any phase; the flag is released on every exit path.

use crate::config::SettingsStore;
use crate::metrics::JobMetrics;
use crate::models::{CompileJob, JobPhase, Platform, SourceFile, dotted_extension};
use crate::services::artifacts::{CLEANUP_DELAY, CleanupReport, cleanup_artifacts, clear_stale_run};
use crate::services::command_builder::{ScriptRequest, ShellDialect, ShellScript, build_instructions};
use crate::services::locator::{CompilerLocator, CompilerSource, ResolvedCompiler, SelectionError};
use crate::services::process::ProcessRunner;
use crate::services::telemetry::{TelemetryClient, TelemetryEvent};
use crate::services::validation::{ValidationError, validate_source};
use crate::state::{JobGuard, StateManager};
use crate::ui::{Document, Editor, TERMINAL_NAME, TerminalHost, TerminalOptions, UserInterface};
use anyhow::Context;
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Why a `run` request did not dispatch anything
#[derive(Error, Debug)]
pub enum RunError {
    #[error("A compile job is already running")]
    AlreadyRunning,

    #[error("No active editor found")]
    NoActiveEditor,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to save file")]
    SaveFailed,

    #[error("No compiler available")]
    CompilerUnavailable,

    #[error("Unexpected error: {0:#}")]
    Unexpected(#[from] anyhow::Error),
}

/// A job whose instructions reached a terminal
#[derive(Debug, Clone)]
pub struct DispatchedJob {
    pub job: CompileJob,
    pub compiler: ResolvedCompiler,
    pub script: ShellScript,
}

/// Coordinates validation, compiler lookup, script generation and the terminal.
pub struct RunOrchestrator<R> {
    locator: CompilerLocator<R>,
    settings: Arc<dyn SettingsStore>,
    editor: Arc<dyn Editor>,
    ui: Arc<dyn UserInterface>,
    terminals: Arc<dyn TerminalHost>,
    telemetry: TelemetryClient,
    state: StateManager,
    metrics: Arc<JobMetrics>,
    platform: Platform,
    cleanup_delay: Duration,
    cleanup_after_session_end: bool,
    sessions_ended: watch::Sender<bool>,
    pending_cleanup: Mutex<Vec<JoinHandle<CleanupReport>>>,
}

impl<R: ProcessRunner> RunOrchestrator<R> {
    pub fn new(
        locator: CompilerLocator<R>,
        settings: Arc<dyn SettingsStore>,
        editor: Arc<dyn Editor>,
        ui: Arc<dyn UserInterface>,
        terminals: Arc<dyn TerminalHost>,
        platform: Platform,
    ) -> Self {
        Self {
            locator,
            settings,
            editor,
            ui,
            terminals,
            telemetry: TelemetryClient::new(true),
            state: StateManager::new(),
            metrics: Arc::new(JobMetrics::new()),
            platform,
            cleanup_delay: CLEANUP_DELAY,
            cleanup_after_session_end: false,
            sessions_ended: watch::Sender::new(false),
            pending_cleanup: Mutex::new(Vec::new()),
        }
    }

    pub fn with_telemetry(mut self, telemetry: TelemetryClient) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<JobMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_cleanup_delay(mut self, delay: Duration) -> Self {
        self.cleanup_delay = delay;
        self
    }

    /// Start the cleanup delay once [`Self::sessions_finished`] is called
    /// instead of at dispatch. For hosts that can tell when their terminals
    /// are done.
    pub fn with_cleanup_after_session_end(mut self) -> Self {
        self.cleanup_after_session_end = true;
        self
    }

    /// Report that the terminals running dispatched scripts have exited.
    pub fn sessions_finished(&self) {
        self.sessions_ended.send_replace(true);
    }

    pub fn state(&self) -> &StateManager {
        &self.state
    }

    pub fn metrics(&self) -> &Arc<JobMetrics> {
        &self.metrics
    }

    pub fn locator(&self) -> &CompilerLocator<R> {
        &self.locator
    }

    /// Compile and run the active document.
    ///
    /// Every failure is also shown to the user and logged. A second call while
    /// a job is active is refused without touching the active job.
    pub async fn run(&self) -> Result<DispatchedJob, RunError> {
        let started = Instant::now();
        let document = self.editor.active_document();
        let source_hint = document
            .as_ref()
            .map(|d| d.path.clone())
            .unwrap_or_default();

        let Some(guard) = self.state.try_begin_job(source_hint) else {
            self.metrics.record_job_rejected();
            self.report(&RunError::AlreadyRunning);
            return Err(RunError::AlreadyRunning);
        };
        self.metrics.record_job_started();

        let result = match document {
            Some(document) => self.execute(&guard, document).await,
            None => Err(RunError::NoActiveEditor),
        };

        match result {
            Ok(dispatched) => {
                guard.finish();
                self.metrics.record_job_dispatched(started.elapsed());
                tracing::info!("Commands sent to terminal for {}", dispatched.job.source.path);
                Ok(dispatched)
            }
            Err(e) => {
                self.metrics.record_job_aborted();
                self.report(&e);
                guard.abort(e.to_string());
                Err(e)
            }
        }
    }

    async fn execute(&self, guard: &JobGuard<'_>, document: Document) -> Result<DispatchedJob, RunError> {
        tracing::info!("=== Pascal Auto Run ===");
        tracing::info!("File: {}", document.path);
        tracing::info!("Platform: {}", self.platform);

        let source = validate_source(&document.path)?;
        let config = self.settings.settings().context("Failed to read settings")?;

        if config.save_before_compile && document.is_dirty && !self.editor.save(&document) {
            return Err(RunError::SaveFailed);
        }

        guard.advance(JobPhase::ResolvingCompiler);
        let compiler = self
            .locator
            .resolve_compiler()
            .await
            .ok_or(RunError::CompilerUnavailable)?;
        self.metrics.record_compiler_resolved(compiler.source);
        guard.set_compiler(compiler.path.clone());
        tracing::info!("Compiler: {} (from {})", compiler.path, compiler.source);

        if config.telemetry_enabled {
            // Detached; the job never waits on it
            let _ = self
                .telemetry
                .send(TelemetryEvent::compile_clicked(self.platform, &source.extension));
        }

        guard.advance(JobPhase::Preparing);
        let job = CompileJob::new(
            source,
            compiler.path.clone(),
            config.trimmed_options(),
            config.pause_after_execution,
            self.platform,
        );
        if !job.options.is_empty() {
            tracing::info!("Compiler options: {}", job.options);
        }

        clear_stale_run(self.locator.runner(), &job).await;
        let script = build_instructions(&ScriptRequest::from_job(&job));

        guard.advance(JobPhase::Running);
        self.dispatch(&job, &script)?;

        if config.cleanup_after_compile {
            self.schedule_cleanup(job.source.clone());
        }

        Ok(DispatchedJob {
            job,
            compiler,
            script,
        })
    }

    /// Open a fresh terminal in the source directory and send the script.
    fn dispatch(&self, job: &CompileJob, script: &ShellScript) -> anyhow::Result<()> {
        let options = TerminalOptions {
            name: TERMINAL_NAME.to_string(),
            cwd: job.source.directory().to_path_buf(),
            dialect: ShellDialect::for_platform(self.platform),
        };

        let mut terminal = self
            .terminals
            .create_terminal(&options)
            .context("Failed to open terminal")?;
        tracing::debug!("Sending script to {}:\n{}", TERMINAL_NAME, script.to_script());
        terminal.show();
        for line in script.terminal_input() {
            terminal
                .send_text(&line)
                .context("Failed to send commands to terminal")?;
        }
        terminal.flush().context("Failed to start terminal commands")?;
        Ok(())
    }

    /// Delete intermediate files after the configured delay, in the background.
    ///
    /// With [`Self::with_cleanup_after_session_end`] the delay starts when the
    /// sessions are reported finished.
    fn schedule_cleanup(&self, source: SourceFile) {
        let delay = self.cleanup_delay;
        let metrics = Arc::clone(&self.metrics);
        let mut sessions_ended = self
            .cleanup_after_session_end
            .then(|| self.sessions_ended.subscribe());
        tracing::debug!("Cleanup of {} scheduled in {:?}", source.path, delay);

        let handle = tokio::spawn(async move {
            if let Some(ended) = sessions_ended.as_mut() {
                // A dropped orchestrator counts as ended
                let _ = ended.wait_for(|ended| *ended).await;
            }
            tokio::time::sleep(delay).await;
            let report = cleanup_artifacts(&source).await;
            metrics.record_artifacts_removed(report.removed.len());
            report
        });

        if let Ok(mut pending) = self.pending_cleanup.lock() {
            pending.push(handle);
        }
    }

    /// Wait for every scheduled cleanup to run.
    pub async fn wait_for_cleanup(&self) -> Vec<CleanupReport> {
        let handles = match self.pending_cleanup.lock() {
            Ok(mut pending) => std::mem::take(&mut *pending),
            Err(_) => Vec::new(),
        };

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => tracing::warn!("Cleanup task failed: {}", e),
            }
        }
        reports
    }

    /// Delete the intermediate files of `path` right away.
    pub async fn clean(&self, path: &Utf8Path) -> CleanupReport {
        let source = SourceFile {
            path: path.to_path_buf(),
            extension: dotted_extension(path),
        };
        let report = cleanup_artifacts(&source).await;
        self.metrics.record_artifacts_removed(report.removed.len());
        report
    }

    /// Let the user pick a compiler, outside of any job.
    pub async fn select_compiler(&self) -> Result<Utf8PathBuf, SelectionError> {
        tracing::info!("Manual compiler selection requested");
        let result = self.locator.select_compiler().await;
        match &result {
            Ok(path) => {
                self.metrics.record_compiler_resolved(CompilerSource::UserSelected);
                tracing::info!("Compiler selected: {}", path);
            }
            Err(e) => tracing::info!("Compiler selection ended: {}", e),
        }
        result
    }

    fn report(&self, error: &RunError) {
        match error {
            RunError::AlreadyRunning => {
                tracing::warn!("{}", error);
                self.ui.show_warning("A compilation is already in progress");
            }
            RunError::Validation(ValidationError::UnsupportedExtension { .. }) => {
                tracing::warn!("{}", error);
                self.ui.show_warning(&error.to_string());
            }
            // The locator already told the user what went wrong
            RunError::CompilerUnavailable => tracing::error!("ERROR: {}", error),
            RunError::Unexpected(e) => {
                tracing::error!("Unexpected error during compile job: {:?}", e);
                self.ui.show_error(&format!("Unexpected error: {:#}", e));
            }
            _ => {
                tracing::error!("{}", error);
                self.ui.show_error(&error.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MockSettingsStore;
    use crate::models::CompilerConfig;
    use crate::services::process::ProbeError;
    use crate::ui::{MockEditor, MockUserInterface, Terminal};

    struct NoProcesses;

    impl ProcessRunner for NoProcesses {
        async fn locate(&self, _command: &str) -> Option<Utf8PathBuf> {
            None
        }

        async fn help_output(&self, program: &Utf8Path) -> Result<String, ProbeError> {
            Err(ProbeError::Launch {
                program: program.to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        }

        async fn kill_program(&self, _executable: &Utf8Path) -> Result<(), ProbeError> {
            Err(ProbeError::ExitCode {
                program: "pkill".to_string(),
                code: 1,
            })
        }
    }

    struct NoTerminals;

    impl TerminalHost for NoTerminals {
        fn create_terminal(&self, _options: &TerminalOptions) -> anyhow::Result<Box<dyn Terminal>> {
            anyhow::bail!("terminal should not be opened")
        }
    }

    fn orchestrator(editor: MockEditor, ui: MockUserInterface) -> RunOrchestrator<NoProcesses> {
        let mut settings = MockSettingsStore::new();
        settings
            .expect_settings()
            .returning(|| Ok(CompilerConfig::default()));
        let settings: Arc<dyn SettingsStore> = Arc::new(settings);
        let ui: Arc<dyn UserInterface> = Arc::new(ui);

        let locator = CompilerLocator::new(NoProcesses, settings.clone(), ui.clone(), Platform::Linux)
            .with_candidates(Vec::new());
        RunOrchestrator::new(
            locator,
            settings,
            Arc::new(editor),
            ui,
            Arc::new(NoTerminals),
            Platform::Linux,
        )
        .with_telemetry(TelemetryClient::new(false))
    }

    #[tokio::test]
    async fn test_no_active_editor_aborts() {
        let mut editor = MockEditor::new();
        editor.expect_active_document().returning(|| None);
        let mut ui = MockUserInterface::new();
        ui.expect_show_error()
            .withf(|msg| msg == "No active editor found")
            .times(1)
            .return_const(());

        let orchestrator = orchestrator(editor, ui);
        let result = orchestrator.run().await;

        assert!(matches!(result, Err(RunError::NoActiveEditor)));
        assert!(!orchestrator.state().is_running());
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_a_warning() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("notes.txt")).unwrap();
        std::fs::write(&path, "").unwrap();

        let mut editor = MockEditor::new();
        editor.expect_active_document().returning(move || {
            Some(Document {
                path: path.clone(),
                is_dirty: false,
            })
        });
        let mut ui = MockUserInterface::new();
        ui.expect_show_warning()
            .withf(|msg| msg.contains(".pas, .pp, .inc, .lpr"))
            .times(1)
            .return_const(());

        let orchestrator = orchestrator(editor, ui);
        let result = orchestrator.run().await;

        assert!(matches!(
            result,
            Err(RunError::Validation(ValidationError::UnsupportedExtension { .. }))
        ));
        assert_eq!(orchestrator.state().read(|s| s.jobs_aborted), 1);
    }

    #[tokio::test]
    async fn test_failed_save_aborts_before_compiler_lookup() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("hello.pas")).unwrap();
        std::fs::write(&path, "begin end.").unwrap();

        let mut editor = MockEditor::new();
        editor.expect_active_document().returning(move || {
            Some(Document {
                path: path.clone(),
                is_dirty: true,
            })
        });
        editor.expect_save().times(1).returning(|_| false);
        let mut ui = MockUserInterface::new();
        ui.expect_show_error()
            .withf(|msg| msg == "Failed to save file")
            .times(1)
            .return_const(());
        ui.expect_choose_missing_compiler_action().never();

        let orchestrator = orchestrator(editor, ui);
        assert!(matches!(orchestrator.run().await, Err(RunError::SaveFailed)));
        assert!(!orchestrator.state().is_running());
    }

    #[tokio::test]
    async fn test_missing_compiler_aborts_without_terminal() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("hello.pas")).unwrap();
        std::fs::write(&path, "begin end.").unwrap();

        let mut editor = MockEditor::new();
        editor.expect_active_document().returning(move || {
            Some(Document {
                path: path.clone(),
                is_dirty: false,
            })
        });
        let mut ui = MockUserInterface::new();
        ui.expect_choose_missing_compiler_action()
            .times(1)
            .returning(|_| None);

        let orchestrator = orchestrator(editor, ui);
        let result = orchestrator.run().await;

        assert!(matches!(result, Err(RunError::CompilerUnavailable)));
        assert_eq!(
            orchestrator.state().read(|s| s.last_abort_reason.clone()),
            Some("No compiler available".to_string())
        );
    }

    #[tokio::test]
    async fn test_clean_without_artifacts_is_empty() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(dir.path().join("hello.pas")).unwrap();

        let orchestrator = orchestrator(MockEditor::new(), MockUserInterface::new());
        assert!(orchestrator.clean(&path).await.is_empty());
        assert!(orchestrator.wait_for_cleanup().await.is_empty());
    }
}
