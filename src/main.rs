//! Pascal Auto Run - compile the current Pascal file and run it in a terminal
//!
//! Main entry point for the command-line application.
//!
//! # Overview
//!
//! The binary stands in for an editor host. It initializes:
//! - Logging infrastructure (daily rotating file, console output with `--verbose`)
//! - Tokio async runtime (subprocess probes, delayed cleanup)
//! - Settings ([`ConfigManager`], a YAML file)
//! - The console host: [`ConsoleUi`], [`CliEditor`] and [`ShellTerminalHost`]
//! - The [`RunOrchestrator`], which owns the run flag for the process
//!
//! # Commands
//!
//! - `run <FILE>`: validate, find a compiler, and compile and run the file
//! - `select-compiler`: pick a compiler interactively and save it
//! - `clean <FILE>`: delete the intermediate files next to a source file
//! - `config show` / `config set <KEY> <VALUE>`: inspect or change settings
//!
//! # Exit Codes
//!
//! `0` when the commands were dispatched (or the action succeeded), `1` when
//! the job aborted or the action failed.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use colored::*;
use pascal_auto_run::services::{TelemetryClient, TelemetryEvent};
use pascal_auto_run::ui::{CliEditor, ConsoleUi, ShellTerminalHost};
use pascal_auto_run::{
    APP_NAME, CompilerLocator, ConfigManager, Platform, RunOrchestrator, SettingKey,
    SettingsStore, SystemRunner, VERSION,
};
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "pascal-auto-run")]
#[command(about = "Compile a Pascal file with Free Pascal and run it", version = env!("CARGO_PKG_VERSION"))]
#[command(propagate_version = true)]
struct Cli {
    /// Directory holding settings.yaml
    #[arg(long, global = true)]
    config_dir: Option<Utf8PathBuf>,

    /// Directory for log files
    #[arg(long, global = true)]
    log_dir: Option<Utf8PathBuf>,

    /// Debug logging, also printed to the console
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a Pascal source file and run it
    Run {
        /// Source file (.pas, .pp, .inc, .lpr)
        file: Utf8PathBuf,
        /// Use the native file dialog when asking for a compiler
        #[arg(long)]
        native_dialog: bool,
    },
    /// Choose the Free Pascal compiler to use
    SelectCompiler {
        /// Use the native file dialog instead of a text prompt
        #[arg(long)]
        native_dialog: bool,
    },
    /// Delete intermediate build files of a source file
    Clean {
        /// Source file whose .o, .ppu and .compiled files are removed
        file: Utf8PathBuf,
    },
    /// Show or change settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print every setting
    Show,
    /// Change one setting, e.g. `config set compilerOptions -O2`
    Set {
        key: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
}

fn main() -> ExitCode {
    match try_main() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn try_main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let log_dir = match &cli.log_dir {
        Some(dir) => dir.clone(),
        None => pascal_auto_run::logging::default_log_dir()?,
    };
    let _log_guard = pascal_auto_run::logging::setup_logging_with_console(
        &log_dir,
        APP_NAME,
        cli.verbose,
        cli.verbose,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let config_dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => ConfigManager::default_config_dir()?,
    };
    let config_manager = Arc::new(ConfigManager::new(&config_dir)?);

    // Subprocess probes and delayed cleanup run here; the shell itself is a
    // plain child process
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("pascal-auto-run-worker")
        .build()
        .context("Failed to create tokio runtime")?;

    let result = runtime.block_on(execute(cli.command, config_manager));

    // Pending analytics may still be in flight; never hold the user up for them
    runtime.shutdown_background();
    tracing::info!("Application shutdown complete");

    result.inspect_err(|e| tracing::error!("Fatal error: {:#}", e))
}

async fn execute(command: Commands, config_manager: Arc<ConfigManager>) -> Result<ExitCode> {
    let platform = Platform::current();

    match command {
        Commands::Run {
            file,
            native_dialog,
        } => run(&file, native_dialog, config_manager, platform).await,
        Commands::SelectCompiler { native_dialog } => {
            let orchestrator = build_orchestrator(
                config_manager,
                None,
                native_dialog,
                ShellTerminalHost::new(),
                platform,
            );
            Ok(match orchestrator.select_compiler().await {
                Ok(_) => ExitCode::SUCCESS,
                Err(_) => ExitCode::FAILURE,
            })
        }
        Commands::Clean { file } => {
            let orchestrator = build_orchestrator(
                config_manager,
                None,
                false,
                ShellTerminalHost::new(),
                platform,
            );
            let report = orchestrator.clean(&file).await;
            for path in &report.removed {
                println!("{} Removed {}", "✓".green(), path);
            }
            for (path, reason) in &report.failed {
                eprintln!("{} Could not remove {}: {}", "✗".red(), path, reason);
            }
            if report.is_empty() {
                println!("Nothing to clean");
            }
            Ok(if report.failed.is_empty() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Config { action } => configure(action, &config_manager),
    }
}

async fn run(
    file: &Utf8Path,
    native_dialog: bool,
    config_manager: Arc<ConfigManager>,
    platform: Platform,
) -> Result<ExitCode> {
    let settings = config_manager.load_settings()?;
    let telemetry = TelemetryClient::new(settings.telemetry_enabled);
    let _ = telemetry.send(TelemetryEvent::app_started(platform, VERSION));

    let terminals = ShellTerminalHost::new();
    let orchestrator = build_orchestrator(
        config_manager,
        Some(file),
        native_dialog,
        terminals.clone(),
        platform,
    )
    .with_telemetry(telemetry)
    .with_cleanup_after_session_end();

    let mut events = orchestrator.state().subscribe();
    tokio::spawn(async move {
        while let Ok(change) = events.recv().await {
            tracing::debug!("State change: {:?}", change);
        }
    });

    let result = orchestrator.run().await;
    tracing::info!("{}", orchestrator.state().snapshot().status_message());

    // The script runs in the foreground; cleanup is timed from its exit
    for status in terminals.wait_for_sessions().await {
        if let Err(e) = status {
            tracing::warn!("Terminal session failed: {}", e);
        }
    }
    orchestrator.sessions_finished();
    for report in orchestrator.wait_for_cleanup().await {
        tracing::debug!("Cleanup report: {:?}", report);
    }

    orchestrator.metrics().log_summary();

    Ok(match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    })
}

fn build_orchestrator(
    config_manager: Arc<ConfigManager>,
    file: Option<&Utf8Path>,
    native_dialog: bool,
    terminals: ShellTerminalHost,
    platform: Platform,
) -> RunOrchestrator<SystemRunner> {
    let settings: Arc<dyn SettingsStore> = config_manager;
    let ui = Arc::new(ConsoleUi::new(native_dialog, platform));
    let locator = CompilerLocator::new(SystemRunner::new(platform), settings.clone(), ui.clone(), platform);

    RunOrchestrator::new(
        locator,
        settings,
        Arc::new(CliEditor::new(file)),
        ui,
        Arc::new(terminals),
        platform,
    )
}

fn configure(action: ConfigAction, config_manager: &ConfigManager) -> Result<ExitCode> {
    match action {
        ConfigAction::Show => {
            let settings = config_manager.load_settings()?;
            println!("{}", config_manager.settings_path().as_str().dimmed());
            for key in SettingKey::ALL {
                println!("{} = {}", key.to_string().bold(), settings.value_of(key));
            }
        }
        ConfigAction::Set { key, value } => {
            let key: SettingKey = key.parse()?;
            config_manager.update(key, &value)?;
            println!("{} {} = {}", "✓".green(), key, value);
        }
    }
    Ok(ExitCode::SUCCESS)
}
