//! Compiler discovery with layered fallbacks.
//!
//! [`CompilerLocator::resolve_compiler`] tries, in order:
//! 1. the path stored in the settings,
//! 2. a PATH lookup (`which` / `where`),
//! 3. a scan of well-known install locations,
//! 4. asking the user.
//!
//! The first strategy that yields a verified compiler wins; later strategies
//! are never attempted. Paths found by strategies 2 to 4 are written back to
//! the settings so the next run takes strategy 1.

use crate::config::SettingsStore;
use crate::models::{Platform, SettingKey};
use crate::services::best_effort::BestEffort;
use crate::services::process::{ProcessRunner, is_accessible};
use crate::services::retry::RetryPolicy;
use crate::ui::{FileFilter, MissingCompilerAction, UserInterface};
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Command name looked up on PATH.
pub const COMPILER_COMMAND: &str = "fpc";

/// Lowercase substring that identifies the compiler's help output.
pub const VENDOR_SIGNATURE: &str = "free pascal";

/// Where users are sent when they have no compiler installed.
pub const DOWNLOAD_URL: &str = "https://www.freepascal.org/download.html";

pub const MISSING_COMPILER_MESSAGE: &str =
    "Free Pascal Compiler (fpc) not found. Please select the compiler executable.";
pub const PICKER_TITLE: &str = "Select Free Pascal Compiler (fpc/fpc.exe)";
pub const SAVED_MESSAGE: &str = "Compiler path saved successfully!";
pub const INVALID_SELECTION_MESSAGE: &str = "Selected file is not a valid Free Pascal Compiler.";

/// Re-read schedule used to confirm a user-selected path was persisted.
pub const SAVE_VERIFY_RETRY: RetryPolicy = RetryPolicy::fixed(3, Duration::from_millis(100));

const WINDOWS_DRIVES: [&str; 3] = ["C:", "D:", "E:"];
const WINDOWS_VERSIONS: [&str; 4] = ["3.2.2", "3.2.0", "3.0.4", "3.0.0"];
const WINDOWS_ARCHS: [&str; 2] = ["i386-win32", "x86_64-win64"];
const WINDOWS_PROGRAM_DIRS: [&str; 3] = ["ProgramFiles", "ProgramFiles(x86)", "ProgramW6432"];
const WINDOWS_VENDOR_SUBDIRS: [&str; 2] = ["FreePascal\\bin\\fpc.exe", "FPC\\bin\\fpc.exe"];

const UNIX_LOCATIONS: [&str; 3] = ["/usr/bin/fpc", "/usr/local/bin/fpc", "/opt/fpc/bin/fpc"];
const UNIX_USER_LOCATION: &str = ".fpc/bin/fpc";
const MACOS_LOCATIONS: [&str; 2] = ["/opt/homebrew/bin/fpc", "/usr/local/opt/fpc/bin/fpc"];

/// Which strategy produced the compiler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompilerSource {
    Configured,
    SystemPath,
    KnownLocation,
    UserSelected,
}

impl fmt::Display for CompilerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CompilerSource::Configured => "configured path",
            CompilerSource::SystemPath => "system PATH",
            CompilerSource::KnownLocation => "known install location",
            CompilerSource::UserSelected => "user selection",
        };
        f.write_str(label)
    }
}

/// A verified compiler and how it was found
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCompiler {
    pub path: Utf8PathBuf,
    pub source: CompilerSource,
}

/// Ways the interactive selection can end without a usable compiler
#[derive(Error, Debug)]
pub enum SelectionError {
    #[error("Compiler selection was cancelled")]
    Cancelled,

    #[error("User chose to download the compiler")]
    DownloadRequested,

    #[error("Selected file does not exist: {0}")]
    NotFound(Utf8PathBuf),

    #[error("Selected file is not a Free Pascal compiler: {0}")]
    NotACompiler(Utf8PathBuf),

    #[error("Failed to save compiler path: {0}")]
    SaveFailed(String),
}

/// Whether help output identifies a Free Pascal compiler.
///
/// Case-insensitive substring match. Any tool whose help mentions the vendor
/// name passes.
pub fn is_compiler_output(output: &str) -> bool {
    output.to_lowercase().contains(VENDOR_SIGNATURE)
}

/// Candidate install locations for `platform`, in scan order.
///
/// `env` resolves environment variables and `home` is the user's home
/// directory, so the list can be built for any platform in tests.
pub fn known_locations<F>(platform: Platform, env: F, home: Option<&Utf8Path>) -> Vec<Utf8PathBuf>
where
    F: Fn(&str) -> Option<String>,
{
    if platform.is_windows() {
        let mut candidates = Vec::new();
        for drive in WINDOWS_DRIVES {
            for version in WINDOWS_VERSIONS {
                for arch in WINDOWS_ARCHS {
                    candidates.push(Utf8PathBuf::from(format!(
                        "{drive}\\FPC\\{version}\\bin\\{arch}\\fpc.exe"
                    )));
                }
            }
        }
        for var in WINDOWS_PROGRAM_DIRS {
            let Some(base) = env(var).filter(|v| !v.is_empty()) else {
                continue;
            };
            for subdir in WINDOWS_VENDOR_SUBDIRS {
                candidates.push(Utf8PathBuf::from(format!(
                    "{}\\{}",
                    base.trim_end_matches('\\'),
                    subdir
                )));
            }
        }
        candidates
    } else {
        let mut candidates: Vec<Utf8PathBuf> =
            UNIX_LOCATIONS.iter().map(Utf8PathBuf::from).collect();
        if let Some(home) = home {
            candidates.push(home.join(UNIX_USER_LOCATION));
        }
        candidates.extend(MACOS_LOCATIONS.iter().map(Utf8PathBuf::from));
        candidates
    }
}

/// Known locations for the machine this process runs on.
pub fn default_known_locations(platform: Platform) -> Vec<Utf8PathBuf> {
    let home = dirs::home_dir().and_then(|h| Utf8PathBuf::try_from(h).ok());
    known_locations(platform, |var| std::env::var(var).ok(), home.as_deref())
}

/// File picker filters for selecting a compiler.
pub fn compiler_file_filters(platform: Platform) -> Vec<FileFilter> {
    if platform.is_windows() {
        vec![
            FileFilter::new("Executable", &["exe"]),
            FileFilter::new("All Files", &["*"]),
        ]
    } else {
        vec![FileFilter::new("All Files", &["*"])]
    }
}

/// Resolves a usable compiler, asking the user as a last resort.
pub struct CompilerLocator<R> {
    runner: R,
    settings: Arc<dyn SettingsStore>,
    ui: Arc<dyn UserInterface>,
    platform: Platform,
    candidates: Vec<Utf8PathBuf>,
    /// Extracts the version from `Free Pascal Compiler version 3.2.2 ...`
    banner_pattern: Regex,
}

impl<R: ProcessRunner> CompilerLocator<R> {
    pub fn new(
        runner: R,
        settings: Arc<dyn SettingsStore>,
        ui: Arc<dyn UserInterface>,
        platform: Platform,
    ) -> Self {
        Self {
            runner,
            settings,
            ui,
            platform,
            candidates: default_known_locations(platform),
            banner_pattern: Regex::new(r"(?i)Free Pascal Compiler version\s+(\S+)")
                .expect("Invalid banner regex"),
        }
    }

    /// Replace the known-location scan list.
    pub fn with_candidates(mut self, candidates: Vec<Utf8PathBuf>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn candidates(&self) -> &[Utf8PathBuf] {
        &self.candidates
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run the fallback chain. `None` means no strategy produced a compiler.
    pub async fn resolve_compiler(&self) -> Option<ResolvedCompiler> {
        let settings = BestEffort::log("Reading settings", self.settings.settings())
            .unwrap_or_default();

        // 1. Configured path
        if let Some(configured) = settings.configured_compiler() {
            let path = Utf8PathBuf::from(configured);
            if !is_accessible(&path) {
                tracing::warn!("Configured compiler is not accessible: {}", path);
            } else if self.verify(&path).await {
                tracing::info!("Using configured compiler: {}", path);
                return Some(ResolvedCompiler {
                    path,
                    source: CompilerSource::Configured,
                });
            } else {
                tracing::warn!("Configured compiler failed verification: {}", path);
            }
        }

        // 2. PATH lookup
        if let Some(path) = self.runner.locate(COMPILER_COMMAND).await {
            tracing::debug!("Found {} on PATH: {}", COMPILER_COMMAND, path);
            if self.verify(&path).await {
                self.remember(&path);
                return Some(ResolvedCompiler {
                    path,
                    source: CompilerSource::SystemPath,
                });
            }
            tracing::warn!("Compiler on PATH failed verification: {}", path);
        }

        // 3. Known install locations
        if let Some(path) = self.first_present_candidate() {
            tracing::debug!("Found compiler candidate: {}", path);
            if self.verify(&path).await {
                self.remember(&path);
                return Some(ResolvedCompiler {
                    path,
                    source: CompilerSource::KnownLocation,
                });
            }
            tracing::warn!("Compiler candidate failed verification: {}", path);
        }

        // 4. Ask the user
        match self.select_compiler().await {
            Ok(path) => Some(ResolvedCompiler {
                path,
                source: CompilerSource::UserSelected,
            }),
            Err(e) => {
                tracing::info!("No compiler selected: {}", e);
                None
            }
        }
    }

    /// Whether `path -h` identifies a Free Pascal compiler.
    ///
    /// A launch failure or timeout counts as "not a compiler". The exit code
    /// is ignored since `fpc -h` exits non-zero on some versions.
    pub async fn verify(&self, path: &Utf8Path) -> bool {
        let output = match self.runner.help_output(path).await {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!("Compiler verification of {} failed: {}", path, e);
                return false;
            }
        };

        if !is_compiler_output(&output) {
            tracing::debug!("{} does not identify as {}", path, VENDOR_SIGNATURE);
            return false;
        }

        match self.banner_pattern.captures(&output) {
            Some(caps) => tracing::info!("Verified Free Pascal {} at {}", &caps[1], path),
            None => tracing::info!("Verified Free Pascal compiler at {}", path),
        }
        true
    }

    /// Interactive selection: offer download or a file picker, then verify and
    /// persist the chosen file.
    pub async fn select_compiler(&self) -> Result<Utf8PathBuf, SelectionError> {
        let action = self
            .ui
            .choose_missing_compiler_action(MISSING_COMPILER_MESSAGE)
            .ok_or(SelectionError::Cancelled)?;

        if action == MissingCompilerAction::Download {
            BestEffort::log("Opening download page", self.ui.open_external(DOWNLOAD_URL));
            return Err(SelectionError::DownloadRequested);
        }

        let path = self
            .ui
            .pick_compiler_file(PICKER_TITLE, &compiler_file_filters(self.platform))
            .ok_or(SelectionError::Cancelled)?;

        if !path.exists() {
            self.ui.show_error(&format!("Selected file does not exist: {}", path));
            return Err(SelectionError::NotFound(path));
        }

        if !self.verify(&path).await {
            self.ui.show_error(INVALID_SELECTION_MESSAGE);
            return Err(SelectionError::NotACompiler(path));
        }

        if let Err(e) = self.persist_verified(&path).await {
            self.ui.show_error(&format!("Failed to save compiler path: {}", e));
            return Err(SelectionError::SaveFailed(e.to_string()));
        }

        self.ui.show_info(SAVED_MESSAGE);
        tracing::info!("Compiler saved: {}", path);
        Ok(path)
    }

    fn first_present_candidate(&self) -> Option<Utf8PathBuf> {
        self.candidates
            .iter()
            .find(|candidate| is_accessible(candidate) || candidate.exists())
            .cloned()
    }

    /// Write a discovered path back to the settings. Failure is only logged.
    fn remember(&self, path: &Utf8Path) {
        if BestEffort::log(
            "Saving discovered compiler path",
            self.settings.update(SettingKey::CompilerPath, path.as_str()),
        )
        .is_some()
        {
            tracing::info!("Saved discovered compiler path: {}", path);
        }
    }

    /// Write the path, then re-read until the store reports it back.
    async fn persist_verified(&self, path: &Utf8Path) -> anyhow::Result<()> {
        self.settings.update(SettingKey::CompilerPath, path.as_str())?;

        let settings = &self.settings;
        SAVE_VERIFY_RETRY
            .retry(|attempt| async move {
                let saved = settings.settings()?;
                if saved.configured_compiler() == Some(path.as_str()) {
                    Ok(())
                } else {
                    tracing::debug!("Saved compiler path not visible yet (attempt {})", attempt);
                    Err(anyhow::anyhow!("Configuration verification failed"))
                }
            })
            .await
    }
}
