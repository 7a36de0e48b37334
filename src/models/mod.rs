//! Data models for Pascal Auto Run.
//!
//! - [`CompilerConfig`]: persisted settings (`compilerPath`, `compilerOptions`, ...)
//!   stored under the `pascal-auto-run` namespace
//! - [`SourceFile`] / [`CompileJob`]: the file being compiled and one compile+run attempt
//! - [`RunState`]: process-lifetime orchestrator state, including the run flag
//! - [`MAX_CONCURRENT_JOBS`]: always 1, a second job is rejected rather than queued
//!
//! None of these are persisted except [`CompilerConfig`].

pub mod app_state;
pub mod config;
pub mod job;

pub use app_state::{JobPhase, MAX_CONCURRENT_JOBS, RunState};
pub use config::{CompilerConfig, ConfigError, SETTINGS_NAMESPACE, SettingKey, SettingsFile};
pub use job::{CompileJob, Platform, RECOGNIZED_EXTENSIONS, SourceFile, dotted_extension};
