use crate::models::{CompilerConfig, SettingKey, SettingsFile};
use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use std::fs;

/// File name of the settings file inside the configuration directory.
pub const SETTINGS_FILE_NAME: &str = "settings.yaml";

/// Key-value settings capability.
///
/// The workflow only ever talks to this trait, so the YAML file below can be
/// swapped for any other store (an editor's configuration API, an in-memory
/// map in tests).
#[cfg_attr(test, mockall::automock)]
pub trait SettingsStore: Send + Sync {
    /// Current settings, with defaults for anything not stored.
    fn settings(&self) -> Result<CompilerConfig>;

    /// Persist a single setting.
    fn update(&self, key: SettingKey, value: &str) -> Result<()>;
}

/// Configuration manager for loading and saving the YAML settings file.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_dir: Utf8PathBuf,
    settings_path: Utf8PathBuf,
}

impl ConfigManager {
    /// Create a new ConfigManager with the specified configuration directory.
    ///
    /// The directory is created if it does not exist yet.
    pub fn new<P: AsRef<Utf8Path>>(config_dir: P) -> Result<Self> {
        let config_dir = config_dir.as_ref().to_path_buf();

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)
                .with_context(|| format!("Failed to create config directory: {}", config_dir))?;
        }

        Ok(Self {
            settings_path: config_dir.join(SETTINGS_FILE_NAME),
            config_dir,
        })
    }

    /// Platform default directory, e.g. `~/.config/pascal-auto-run` on Linux.
    pub fn default_config_dir() -> Result<Utf8PathBuf> {
        let base = dirs::config_dir().context("Could not determine the user config directory")?;
        let dir = Utf8PathBuf::try_from(base)
            .context("User config directory is not valid UTF-8")?
            .join(crate::models::SETTINGS_NAMESPACE);
        Ok(dir)
    }

    /// Load the settings file.
    ///
    /// # Returns
    /// The loaded settings, or defaults if the file doesn't exist
    pub fn load_settings(&self) -> Result<CompilerConfig> {
        if !self.settings_path.exists() {
            tracing::warn!(
                "Settings file not found at {}, using defaults",
                self.settings_path
            );
            return Ok(CompilerConfig::default());
        }

        let file_contents = fs::read_to_string(&self.settings_path)
            .with_context(|| format!("Failed to read settings: {}", self.settings_path))?;

        // An empty file is valid and means "all defaults".
        if file_contents.trim().is_empty() {
            return Ok(CompilerConfig::default());
        }

        let file: SettingsFile = serde_yaml_ng::from_str(&file_contents)
            .with_context(|| format!("Failed to parse settings: {}", self.settings_path))?;

        tracing::debug!("Loaded settings from {}", self.settings_path);
        Ok(file.settings)
    }

    /// Save the complete settings file.
    pub fn save_settings(&self, settings: &CompilerConfig) -> Result<()> {
        let file = SettingsFile {
            settings: settings.clone(),
        };
        let yaml_string =
            serde_yaml_ng::to_string(&file).context("Failed to serialize settings to YAML")?;

        fs::write(&self.settings_path, yaml_string)
            .with_context(|| format!("Failed to write settings: {}", self.settings_path))?;

        tracing::info!("Saved settings to {}", self.settings_path);
        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir(&self) -> &Utf8Path {
        &self.config_dir
    }

    /// Get the settings file path.
    pub fn settings_path(&self) -> &Utf8Path {
        &self.settings_path
    }
}

impl SettingsStore for ConfigManager {
    fn settings(&self) -> Result<CompilerConfig> {
        self.load_settings()
    }

    fn update(&self, key: SettingKey, value: &str) -> Result<()> {
        let mut settings = self.load_settings()?;
        settings.apply(key, value)?;
        self.save_settings(&settings)?;

        tracing::info!("Updated {} = {:?}", key, value);
        Ok(())
    }
}
