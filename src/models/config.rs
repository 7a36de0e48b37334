use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Namespace under which every setting is stored.
pub const SETTINGS_NAMESPACE: &str = "pascal-auto-run";

/// On-disk layout of the settings file.
///
/// All keys live under a single namespace so the file can be shared with
/// other tools without collisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(rename = "pascal-auto-run", default)]
    pub settings: CompilerConfig,
}

/// User and persisted settings read at each invocation.
///
/// `compiler_path` is the only field the workflow itself writes back (after a
/// successful discovery). Everything else changes only when the user edits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilerConfig {
    #[serde(default)]
    pub compiler_path: String,

    #[serde(default)]
    pub compiler_options: String,

    #[serde(default)]
    pub cleanup_after_compile: bool,

    #[serde(default = "default_true")]
    pub save_before_compile: bool,

    #[serde(default = "default_true")]
    pub pause_after_execution: bool,

    #[serde(default = "default_true")]
    pub telemetry_enabled: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            compiler_path: String::new(),
            compiler_options: String::new(),
            cleanup_after_compile: false,
            save_before_compile: true,
            pause_after_execution: true,
            telemetry_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl CompilerConfig {
    /// Configured compiler path, trimmed, or `None` when unset.
    pub fn configured_compiler(&self) -> Option<&str> {
        let trimmed = self.compiler_path.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }

    /// Compiler options with surrounding whitespace removed.
    pub fn trimmed_options(&self) -> &str {
        self.compiler_options.trim()
    }

    /// Render a single setting as the string shown by `config show`.
    pub fn value_of(&self, key: SettingKey) -> String {
        match key {
            SettingKey::CompilerPath => self.compiler_path.clone(),
            SettingKey::CompilerOptions => self.compiler_options.clone(),
            SettingKey::CleanupAfterCompile => self.cleanup_after_compile.to_string(),
            SettingKey::SaveBeforeCompile => self.save_before_compile.to_string(),
            SettingKey::PauseAfterExecution => self.pause_after_execution.to_string(),
            SettingKey::TelemetryEnabled => self.telemetry_enabled.to_string(),
        }
    }

    /// Apply a string value to the given key, parsing booleans where needed.
    pub fn apply(&mut self, key: SettingKey, value: &str) -> Result<(), ConfigError> {
        match key {
            SettingKey::CompilerPath => self.compiler_path = value.trim().to_string(),
            SettingKey::CompilerOptions => self.compiler_options = value.to_string(),
            SettingKey::CleanupAfterCompile => self.cleanup_after_compile = parse_bool(key, value)?,
            SettingKey::SaveBeforeCompile => self.save_before_compile = parse_bool(key, value)?,
            SettingKey::PauseAfterExecution => self.pause_after_execution = parse_bool(key, value)?,
            SettingKey::TelemetryEnabled => self.telemetry_enabled = parse_bool(key, value)?,
        }
        Ok(())
    }
}

fn parse_bool(key: SettingKey, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

/// Keys of the persisted settings, named as they appear in the settings file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    CompilerPath,
    CompilerOptions,
    CleanupAfterCompile,
    SaveBeforeCompile,
    PauseAfterExecution,
    TelemetryEnabled,
}

impl SettingKey {
    pub const ALL: [SettingKey; 6] = [
        SettingKey::CompilerPath,
        SettingKey::CompilerOptions,
        SettingKey::CleanupAfterCompile,
        SettingKey::SaveBeforeCompile,
        SettingKey::PauseAfterExecution,
        SettingKey::TelemetryEnabled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKey::CompilerPath => "compilerPath",
            SettingKey::CompilerOptions => "compilerOptions",
            SettingKey::CleanupAfterCompile => "cleanupAfterCompile",
            SettingKey::SaveBeforeCompile => "saveBeforeCompile",
            SettingKey::PauseAfterExecution => "pauseAfterExecution",
            SettingKey::TelemetryEnabled => "telemetryEnabled",
        }
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", SETTINGS_NAMESPACE, self.as_str())
    }
}

impl FromStr for SettingKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept both the bare key and the namespaced form.
        let bare = s
            .strip_prefix(SETTINGS_NAMESPACE)
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(s);

        SettingKey::ALL
            .into_iter()
            .find(|key| key.as_str().eq_ignore_ascii_case(bare))
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

/// Errors raised when reading or changing a single setting
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown setting: {0}")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for {key}")]
    InvalidValue { key: SettingKey, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compiler_config_defaults() {
        let config = CompilerConfig::default();
        assert!(config.compiler_path.is_empty());
        assert!(config.compiler_options.is_empty());
        assert!(!config.cleanup_after_compile);
        assert!(config.save_before_compile);
        assert!(config.pause_after_execution);
        assert!(config.telemetry_enabled);
    }

    #[test]
    fn test_missing_keys_use_defaults() {
        let yaml = "pascal-auto-run:\n  compilerOptions: \"-O2\"\n";
        let file: SettingsFile = serde_yaml_ng::from_str(yaml).unwrap();

        assert_eq!(file.settings.compiler_options, "-O2");
        assert!(file.settings.save_before_compile);
        assert!(file.settings.pause_after_execution);
    }

    #[test]
    fn test_serialized_keys_are_camel_case() {
        let yaml = serde_yaml_ng::to_string(&SettingsFile::default()).unwrap();
        assert!(yaml.contains("pascal-auto-run:"));
        assert!(yaml.contains("compilerPath"));
        assert!(yaml.contains("pauseAfterExecution"));
    }

    #[test]
    fn test_configured_compiler_trims_whitespace() {
        let mut config = CompilerConfig::default();
        assert_eq!(config.configured_compiler(), None);

        config.compiler_path = "   ".to_string();
        assert_eq!(config.configured_compiler(), None);

        config.compiler_path = "  /usr/bin/fpc ".to_string();
        assert_eq!(config.configured_compiler(), Some("/usr/bin/fpc"));
    }

    #[test]
    fn test_setting_key_parsing() {
        assert_eq!("compilerPath".parse::<SettingKey>(), Ok(SettingKey::CompilerPath));
        assert_eq!(
            "pascal-auto-run.cleanupAfterCompile".parse::<SettingKey>(),
            Ok(SettingKey::CleanupAfterCompile)
        );
        assert_eq!(
            "nope".parse::<SettingKey>(),
            Err(ConfigError::UnknownKey("nope".to_string()))
        );
    }

    #[test]
    fn test_apply_bool_values() {
        let mut config = CompilerConfig::default();
        config.apply(SettingKey::CleanupAfterCompile, "true").unwrap();
        config.apply(SettingKey::PauseAfterExecution, "off").unwrap();

        assert!(config.cleanup_after_compile);
        assert!(!config.pause_after_execution);

        let err = config.apply(SettingKey::SaveBeforeCompile, "maybe").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }
}
