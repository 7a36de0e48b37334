// Pascal Auto Run - compile the current Pascal file and run it in a terminal
//
// This is the library crate containing the workflow, its host capability
// traits and the command-line host. The binary crate (main.rs) provides the
// CLI entry point.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;
pub mod state;
pub mod ui;

// Re-export commonly used types for convenience
pub use config::{ConfigManager, SettingsStore};
pub use metrics::JobMetrics;
pub use models::{CompileJob, CompilerConfig, Platform, SettingKey};
pub use services::{CompilerLocator, RunError, RunOrchestrator, SystemRunner};
pub use state::{StateChange, StateManager};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
