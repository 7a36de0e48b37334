// UI module - host capabilities the workflow talks to
//
// This module contains:
// - The capability traits: UserInterface, Editor, TerminalHost / Terminal
// - ConsoleUi / CliEditor: the command-line implementations of the first two
// - ShellTerminalHost: runs dispatched commands in bash or PowerShell
//
// Nothing in services/ depends on a concrete host, only on these traits.

pub mod console;
pub mod terminal;

pub use console::{CliEditor, ConsoleUi};
pub use terminal::{ShellTerminal, ShellTerminalHost};

use crate::services::command_builder::ShellDialect;
use anyhow::Result;
use camino::Utf8PathBuf;

/// Name of the terminal session that receives the generated commands.
pub const TERMINAL_NAME: &str = "Pascal Auto Run";

/// Answer to the "compiler not found" prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingCompilerAction {
    SelectCompiler,
    Download,
}

/// File type filter for the compiler picker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFilter {
    pub name: String,
    pub extensions: Vec<String>,
}

impl FileFilter {
    pub fn new(name: &str, extensions: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Messages, prompts and dialogs.
#[cfg_attr(test, mockall::automock)]
pub trait UserInterface: Send + Sync {
    fn show_info(&self, message: &str);
    fn show_warning(&self, message: &str);
    fn show_error(&self, message: &str);

    /// Ask what to do about a missing compiler. `None` means dismissed.
    fn choose_missing_compiler_action(&self, message: &str) -> Option<MissingCompilerAction>;

    /// Let the user pick a compiler executable. `None` means cancelled.
    fn pick_compiler_file(&self, title: &str, filters: &[FileFilter]) -> Option<Utf8PathBuf>;

    /// Open a URL in the user's browser.
    fn open_external(&self, url: &str) -> Result<()>;
}

/// The document currently open in the editor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub path: Utf8PathBuf,
    pub is_dirty: bool,
}

/// Access to the active editor.
#[cfg_attr(test, mockall::automock)]
pub trait Editor: Send + Sync {
    /// `None` when no editor (or no file) is active.
    fn active_document(&self) -> Option<Document>;

    /// Save the document; `false` if saving failed.
    fn save(&self, document: &Document) -> bool;
}

/// How to open a terminal session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminalOptions {
    pub name: String,
    pub cwd: Utf8PathBuf,
    pub dialect: ShellDialect,
}

/// An open terminal session. Text sent is typed into the shell verbatim.
pub trait Terminal: Send {
    fn show(&mut self);
    fn send_text(&mut self, text: &str) -> Result<()>;

    /// Make sure everything sent so far is executing.
    ///
    /// Interactive terminals run each line as it arrives and need nothing here.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Creates terminal sessions.
pub trait TerminalHost: Send + Sync {
    fn create_terminal(&self, options: &TerminalOptions) -> Result<Box<dyn Terminal>>;
}
