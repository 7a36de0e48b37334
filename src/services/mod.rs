//! Services module - the compile-and-run workflow, independent of any host.
//!
//! Nothing here talks to a concrete editor, console or terminal; the host is
//! reached only through the traits in [`crate::ui`] and [`crate::config`], and
//! subprocesses only through [`ProcessRunner`].
//!
//! # Components
//!
//! - [`CompilerLocator`]: finds a verified Free Pascal compiler through the
//!   configured path, PATH, known install locations and finally the user.
//! - [`build_instructions`]: turns a [`CompileJob`](crate::models::CompileJob)
//!   into bash or PowerShell lines that compile, check, run and optionally
//!   pause. Pure; no I/O.
//! - [`RunOrchestrator`]: validates the active file, resolves the compiler,
//!   clears a stale run, dispatches the script to a terminal and schedules
//!   artifact cleanup. Owns the run flag.
//! - [`RetryPolicy`] and [`BestEffort`]: the bounded-retry combinator and the
//!   wrapper for operations whose failure must not affect the job.
//!
//! # Usage Example
//!
//! ```ignore
//! let locator = CompilerLocator::new(SystemRunner::default(), settings.clone(), ui.clone(), platform);
//! let orchestrator = RunOrchestrator::new(locator, settings, editor, ui, terminals, platform);
//!
//! match orchestrator.run().await {
//!     Ok(dispatched) => println!("Running {}", dispatched.job.executable),
//!     Err(e) => eprintln!("{e}"),
//! }
//! ```

pub mod artifacts;
pub mod best_effort;
pub mod command_builder;
pub mod locator;
pub mod orchestrator;
pub mod process;
pub mod retry;
pub mod telemetry;
pub mod validation;

pub use artifacts::{ARTIFACT_EXTENSIONS, CleanupReport, cleanup_artifacts};
pub use best_effort::BestEffort;
pub use command_builder::{ScriptRequest, ShellDialect, ShellScript, build_instructions};
pub use locator::{CompilerLocator, CompilerSource, ResolvedCompiler, SelectionError};
pub use orchestrator::{DispatchedJob, RunError, RunOrchestrator};
pub use process::{ProbeError, ProcessRunner, SystemRunner};
pub use retry::RetryPolicy;
pub use telemetry::{TelemetryClient, TelemetryEvent};
pub use validation::{ValidationError, validate_source};
