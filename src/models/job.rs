use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Source extensions accepted by the compile-and-run workflow (lowercase, with dot).
pub const RECOGNIZED_EXTENSIONS: [&str; 4] = [".pas", ".pp", ".inc", ".lpr"];

/// Host platform, as far as shell dialect and executable naming are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
    /// Any other Unix-like system (BSDs, illumos, ...)
    OtherUnix,
}

impl Platform {
    /// Platform this binary was compiled for.
    pub fn current() -> Self {
        match std::env::consts::OS {
            "windows" => Platform::Windows,
            "linux" => Platform::Linux,
            "macos" => Platform::MacOs,
            _ => Platform::OtherUnix,
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Platform::Windows)
    }

    /// Name reported in logs and analytics events.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::Linux => "linux",
            Platform::MacOs => "macos",
            Platform::OtherUnix => "unix",
        }
    }

    /// Suffix appended to produced executables (empty outside Windows).
    pub fn executable_suffix(&self) -> &'static str {
        if self.is_windows() { ".exe" } else { "" }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The file being compiled, after validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: Utf8PathBuf,
    /// Lowercased extension including the leading dot, e.g. `.pas`.
    pub extension: String,
}

impl SourceFile {
    /// Directory holding the source file; the compiler writes its output here.
    pub fn directory(&self) -> &Utf8Path {
        self.path.parent().unwrap_or(Utf8Path::new("."))
    }

    /// File name without extension.
    pub fn base_name(&self) -> &str {
        self.path.file_stem().unwrap_or_default()
    }

    /// Where the compiler is expected to place the executable.
    pub fn executable_path(&self, platform: Platform) -> Utf8PathBuf {
        let file_name = format!("{}{}", self.base_name(), platform.executable_suffix());
        self.directory().join(file_name)
    }
}

/// Lowercased extension of `path` including the dot, or an empty string.
pub fn dotted_extension(path: &Utf8Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// One compile-and-run attempt. Created per invocation and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileJob {
    pub source: SourceFile,
    pub compiler: Utf8PathBuf,
    pub executable: Utf8PathBuf,
    pub options: String,
    pub pause_after_run: bool,
    pub platform: Platform,
}

impl CompileJob {
    pub fn new(
        source: SourceFile,
        compiler: Utf8PathBuf,
        options: impl Into<String>,
        pause_after_run: bool,
        platform: Platform,
    ) -> Self {
        let executable = source.executable_path(platform);
        Self {
            source,
            compiler,
            executable,
            options: options.into(),
            pause_after_run,
            platform,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(path: &str) -> SourceFile {
        let path = Utf8PathBuf::from(path);
        SourceFile {
            extension: dotted_extension(&path),
            path,
        }
    }

    #[test]
    fn test_executable_path_unix() {
        let src = source("/tmp/foo.pas");
        assert_eq!(src.executable_path(Platform::Linux), Utf8PathBuf::from("/tmp/foo"));
        assert_eq!(src.executable_path(Platform::MacOs), Utf8PathBuf::from("/tmp/foo"));
    }

    #[test]
    fn test_executable_path_windows_adds_suffix() {
        let src = source("/work/hello.lpr");
        assert_eq!(
            src.executable_path(Platform::Windows),
            Utf8PathBuf::from("/work/hello.exe")
        );
    }

    #[test]
    fn test_dotted_extension_is_lowercase() {
        assert_eq!(dotted_extension(Utf8Path::new("A.PAS")), ".pas");
        assert_eq!(dotted_extension(Utf8Path::new("Makefile")), "");
    }

    #[test]
    fn test_windows_executable_name() {
        let job = CompileJob::new(
            source("/tmp/foo.pas"),
            Utf8PathBuf::from("/usr/bin/fpc"),
            "",
            true,
            Platform::Windows,
        );
        assert_eq!(job.executable, Utf8PathBuf::from("/tmp/foo.exe"));
    }
}
