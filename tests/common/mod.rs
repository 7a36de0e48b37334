//! Shared fakes for the integration tests.
//!
//! Every host capability and the process runner get an in-memory stand-in
//! that records how it was used.

#![allow(dead_code)]

use anyhow::Result;
use camino::{Utf8Path, Utf8PathBuf};
use pascal_auto_run::config::SettingsStore;
use pascal_auto_run::models::{CompilerConfig, Platform, SettingKey};
use pascal_auto_run::services::process::{ProbeError, ProcessRunner};
use pascal_auto_run::services::telemetry::TelemetryClient;
use pascal_auto_run::services::{CompilerLocator, RunOrchestrator};
use pascal_auto_run::ui::{
    Document, Editor, FileFilter, MissingCompilerAction, Terminal, TerminalHost, TerminalOptions,
    UserInterface,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::Notify;

pub const BANNER: &str = "Free Pascal Compiler version 3.2.2 [2021/05/16] for x86_64";

// ===== Settings =====

#[derive(Default)]
pub struct MemorySettings {
    pub config: Mutex<CompilerConfig>,
    pub updates: Mutex<Vec<(SettingKey, String)>>,
    pub fail_updates: bool,
}

impl MemorySettings {
    pub fn with(config: CompilerConfig) -> Self {
        Self {
            config: Mutex::new(config),
            ..Self::default()
        }
    }

    pub fn compiler_path(&self) -> String {
        self.config.lock().unwrap().compiler_path.clone()
    }

    pub fn update_count(&self) -> usize {
        self.updates.lock().unwrap().len()
    }
}

impl SettingsStore for MemorySettings {
    fn settings(&self) -> Result<CompilerConfig> {
        Ok(self.config.lock().unwrap().clone())
    }

    fn update(&self, key: SettingKey, value: &str) -> Result<()> {
        self.updates.lock().unwrap().push((key, value.to_string()));
        if self.fail_updates {
            anyhow::bail!("settings are read-only");
        }
        self.config.lock().unwrap().apply(key, value)?;
        Ok(())
    }
}

// ===== User interface =====

#[derive(Default)]
pub struct RecordingUi {
    pub action: Option<MissingCompilerAction>,
    pub picked: Option<Utf8PathBuf>,
    pub infos: Mutex<Vec<String>>,
    pub warnings: Mutex<Vec<String>>,
    pub errors: Mutex<Vec<String>>,
    pub prompts: AtomicUsize,
    pub opened: Mutex<Vec<String>>,
}

impl RecordingUi {
    pub fn picking(path: Utf8PathBuf) -> Self {
        Self {
            action: Some(MissingCompilerAction::SelectCompiler),
            picked: Some(path),
            ..Self::default()
        }
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn warnings(&self) -> Vec<String> {
        self.warnings.lock().unwrap().clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }
}

impl UserInterface for RecordingUi {
    fn show_info(&self, message: &str) {
        self.infos.lock().unwrap().push(message.to_string());
    }

    fn show_warning(&self, message: &str) {
        self.warnings.lock().unwrap().push(message.to_string());
    }

    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn choose_missing_compiler_action(&self, _message: &str) -> Option<MissingCompilerAction> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.action
    }

    fn pick_compiler_file(&self, _title: &str, _filters: &[FileFilter]) -> Option<Utf8PathBuf> {
        self.picked.clone()
    }

    fn open_external(&self, url: &str) -> Result<()> {
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

// ===== Editor =====

pub struct FakeEditor {
    pub document: Option<Document>,
    pub save_succeeds: bool,
    pub saves: AtomicUsize,
}

impl FakeEditor {
    pub fn with_file(path: &Utf8Path, is_dirty: bool) -> Self {
        Self {
            document: Some(Document {
                path: path.to_path_buf(),
                is_dirty,
            }),
            save_succeeds: true,
            saves: AtomicUsize::new(0),
        }
    }

    pub fn empty() -> Self {
        Self {
            document: None,
            save_succeeds: true,
            saves: AtomicUsize::new(0),
        }
    }
}

impl Editor for FakeEditor {
    fn active_document(&self) -> Option<Document> {
        self.document.clone()
    }

    fn save(&self, _document: &Document) -> bool {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.save_succeeds
    }
}

// ===== Terminals =====

#[derive(Debug, Clone, Default)]
pub struct RecordedSession {
    pub options: Option<TerminalOptions>,
    pub shown: bool,
    pub lines: Vec<String>,
    pub flushed: bool,
}

#[derive(Clone, Default)]
pub struct RecordingTerminals {
    pub sessions: Arc<Mutex<Vec<RecordedSession>>>,
}

impl RecordingTerminals {
    pub fn sessions(&self) -> Vec<RecordedSession> {
        self.sessions.lock().unwrap().clone()
    }
}

struct RecordingTerminal {
    index: usize,
    sessions: Arc<Mutex<Vec<RecordedSession>>>,
}

impl Terminal for RecordingTerminal {
    fn show(&mut self) {
        self.sessions.lock().unwrap()[self.index].shown = true;
    }

    fn send_text(&mut self, text: &str) -> Result<()> {
        self.sessions.lock().unwrap()[self.index]
            .lines
            .push(text.to_string());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.sessions.lock().unwrap()[self.index].flushed = true;
        Ok(())
    }
}

impl TerminalHost for RecordingTerminals {
    fn create_terminal(&self, options: &TerminalOptions) -> Result<Box<dyn Terminal>> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.push(RecordedSession {
            options: Some(options.clone()),
            ..RecordedSession::default()
        });
        Ok(Box::new(RecordingTerminal {
            index: sessions.len() - 1,
            sessions: Arc::clone(&self.sessions),
        }))
    }
}

// ===== Process runner =====

/// Runner that knows a fixed set of "compilers" and records every call.
#[derive(Default)]
pub struct FakeRunner {
    pub on_path: Option<Utf8PathBuf>,
    pub compilers: HashSet<Utf8PathBuf>,
    /// When set, `help_output` waits for a notification before answering
    pub gate: Option<Arc<Notify>>,
    pub locate_calls: AtomicUsize,
    pub help_calls: Mutex<Vec<Utf8PathBuf>>,
    pub kills: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub fn knowing(compilers: &[&Utf8Path]) -> Self {
        Self {
            compilers: compilers.iter().map(|p| p.to_path_buf()).collect(),
            ..Self::default()
        }
    }

    pub fn locate_count(&self) -> usize {
        self.locate_calls.load(Ordering::SeqCst)
    }

    pub fn help_requests(&self) -> Vec<Utf8PathBuf> {
        self.help_calls.lock().unwrap().clone()
    }
}

impl ProcessRunner for FakeRunner {
    async fn locate(&self, _command: &str) -> Option<Utf8PathBuf> {
        self.locate_calls.fetch_add(1, Ordering::SeqCst);
        self.on_path.clone()
    }

    async fn help_output(&self, program: &Utf8Path) -> Result<String, ProbeError> {
        self.help_calls.lock().unwrap().push(program.to_path_buf());
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.compilers.contains(program) {
            Ok(format!("{BANNER}\nUsage: fpc [options] <inputfile>\n"))
        } else {
            Ok("usage: something-else [--help]\n".to_string())
        }
    }

    async fn kill_program(&self, executable: &Utf8Path) -> Result<(), ProbeError> {
        self.kills.lock().unwrap().push(executable.to_string());
        Err(ProbeError::ExitCode {
            program: "pkill".to_string(),
            code: 1,
        })
    }
}

// ===== Filesystem fixtures =====

pub fn temp_dir() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let path = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, path)
}

/// Write a Pascal source file into `dir`.
pub fn write_source(dir: &Utf8Path, name: &str) -> Utf8PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, "program hello;\nbegin\n  writeln('hi');\nend.\n").unwrap();
    path
}

/// Write an executable file into `dir`. On Unix it is a shell script that
/// prints the compiler banner, so it also works with the real runner.
pub fn write_fake_compiler(dir: &Utf8Path, name: &str) -> Utf8PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\necho '{BANNER}'\nexit 1\n")).unwrap();
    make_executable(&path);
    path
}

#[cfg(unix)]
pub fn make_executable(path: &Utf8Path) {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Utf8Path) {}

// ===== Wiring =====

pub struct Harness {
    pub settings: Arc<MemorySettings>,
    pub ui: Arc<RecordingUi>,
    pub editor: Arc<FakeEditor>,
    pub terminals: RecordingTerminals,
    pub orchestrator: RunOrchestrator<FakeRunner>,
}

impl Harness {
    pub fn new(
        runner: FakeRunner,
        settings: MemorySettings,
        ui: RecordingUi,
        editor: FakeEditor,
        candidates: Vec<Utf8PathBuf>,
        platform: Platform,
    ) -> Self {
        let settings = Arc::new(settings);
        let ui = Arc::new(ui);
        let editor = Arc::new(editor);
        let terminals = RecordingTerminals::default();

        let locator = CompilerLocator::new(runner, settings.clone(), ui.clone(), platform)
            .with_candidates(candidates);
        let orchestrator = RunOrchestrator::new(
            locator,
            settings.clone(),
            editor.clone(),
            ui.clone(),
            Arc::new(terminals.clone()),
            platform,
        )
        .with_telemetry(TelemetryClient::new(false))
        .with_cleanup_delay(Duration::from_millis(10));

        Self {
            settings,
            ui,
            editor,
            terminals,
            orchestrator,
        }
    }

    pub fn runner(&self) -> &FakeRunner {
        self.orchestrator.locator().runner()
    }
}

pub fn config_with_compiler(path: &Utf8Path) -> CompilerConfig {
    CompilerConfig {
        compiler_path: path.to_string(),
        ..CompilerConfig::default()
    }
}
