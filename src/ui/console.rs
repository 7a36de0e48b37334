// Console host - the command-line stand-ins for the editor's UI and document
//
// Messages go to stdout/stderr with colored markers, prompts use inquire, and
// the compiler picker is either a text prompt or a native dialog (rfd).

use super::{Document, Editor, FileFilter, MissingCompilerAction, UserInterface};
use crate::models::Platform;
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use colored::*;
use inquire::{Select, Text};
use std::process::{Command, Stdio};

const SELECT_COMPILER_CHOICE: &str = "Select Compiler";
const DOWNLOAD_CHOICE: &str = "Download FPC";

/// [`UserInterface`] for an interactive terminal session.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleUi {
    native_dialog: bool,
    platform: Platform,
}

impl ConsoleUi {
    /// `native_dialog` switches the compiler picker to the OS file dialog.
    pub fn new(native_dialog: bool, platform: Platform) -> Self {
        Self {
            native_dialog,
            platform,
        }
    }

    fn pick_with_dialog(title: &str, filters: &[FileFilter]) -> Option<Utf8PathBuf> {
        use rfd::FileDialog;

        let mut dialog = FileDialog::new().set_title(title);
        for filter in filters {
            dialog = dialog.add_filter(&filter.name, filter.extensions.as_slice());
        }

        dialog.pick_file().and_then(|path| {
            Utf8PathBuf::try_from(path)
                .map_err(|e| {
                    tracing::error!("Failed to convert path to UTF-8: {}", e);
                    e
                })
                .ok()
        })
    }

    fn pick_with_prompt(title: &str) -> Option<Utf8PathBuf> {
        let answer = Text::new(&format!("{title}:"))
            .with_help_message("Full path to the compiler executable, empty to cancel")
            .prompt()
            .map_err(|e| tracing::debug!("Compiler prompt closed: {}", e))
            .ok()?;

        let trimmed = answer.trim().trim_matches('"');
        (!trimmed.is_empty()).then(|| Utf8PathBuf::from(trimmed))
    }
}

impl UserInterface for ConsoleUi {
    fn show_info(&self, message: &str) {
        println!("{} {}", "✓".green(), message);
    }

    fn show_warning(&self, message: &str) {
        eprintln!("{} {}", "!".yellow().bold(), message.yellow());
    }

    fn show_error(&self, message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message.red());
    }

    fn choose_missing_compiler_action(&self, message: &str) -> Option<MissingCompilerAction> {
        eprintln!("{} {}", "✗".red().bold(), message.red());

        let choice = Select::new(
            "What would you like to do?",
            vec![SELECT_COMPILER_CHOICE, DOWNLOAD_CHOICE],
        )
        .prompt()
        .map_err(|e| tracing::debug!("Missing compiler prompt closed: {}", e))
        .ok()?;

        match choice {
            SELECT_COMPILER_CHOICE => Some(MissingCompilerAction::SelectCompiler),
            DOWNLOAD_CHOICE => Some(MissingCompilerAction::Download),
            _ => None,
        }
    }

    fn pick_compiler_file(&self, title: &str, filters: &[FileFilter]) -> Option<Utf8PathBuf> {
        if self.native_dialog {
            Self::pick_with_dialog(title, filters)
        } else {
            Self::pick_with_prompt(title)
        }
    }

    fn open_external(&self, url: &str) -> Result<()> {
        let mut cmd = match self.platform {
            Platform::Windows => {
                let mut cmd = Command::new("cmd");
                cmd.args(["/C", "start", "", url]);
                cmd
            }
            Platform::MacOs => {
                let mut cmd = Command::new("open");
                cmd.arg(url);
                cmd
            }
            Platform::Linux | Platform::OtherUnix => {
                let mut cmd = Command::new("xdg-open");
                cmd.arg(url);
                cmd
            }
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("Failed to open {}", url))?;

        println!("{} Opening {}", "→".blue(), url.underline());
        Ok(())
    }
}

/// [`Editor`] whose only document is the file named on the command line.
///
/// Files on disk are always saved, so the document is never dirty.
#[derive(Debug, Clone, Default)]
pub struct CliEditor {
    file: Option<Utf8PathBuf>,
}

impl CliEditor {
    pub fn new(file: Option<&Utf8Path>) -> Self {
        Self {
            file: file.map(absolute),
        }
    }
}

impl Editor for CliEditor {
    fn active_document(&self) -> Option<Document> {
        self.file.as_ref().map(|path| Document {
            path: path.clone(),
            is_dirty: false,
        })
    }

    fn save(&self, _document: &Document) -> bool {
        true
    }
}

/// Make `path` absolute without requiring it to exist.
fn absolute(path: &Utf8Path) -> Utf8PathBuf {
    std::path::absolute(path)
        .ok()
        .and_then(|p| Utf8PathBuf::try_from(p).ok())
        .unwrap_or_else(|| path.to_path_buf())
}
