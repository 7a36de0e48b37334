use crate::models::{RECOGNIZED_EXTENSIONS, SourceFile, dotted_extension};
use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Reasons a file cannot be compiled. The job never starts on any of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File not found: {0}")]
    FileNotFound(Utf8PathBuf),

    #[error("Unsupported file extension '{}'. Supported: {}", .extension, RECOGNIZED_EXTENSIONS.join(", "))]
    UnsupportedExtension { extension: String },

    #[error("Directory is not writable: {0}")]
    DirectoryNotWritable(Utf8PathBuf),

    #[error("Invalid file path: path contains line break characters")]
    LineBreakInPath,

    #[error("File has no parent directory: {0}")]
    NoParentDirectory(Utf8PathBuf),
}

/// Check that `path` names a compilable Pascal source in a writable directory.
///
/// Line breaks are rejected first, before touching the filesystem, since the
/// path ends up inside shell instructions.
pub fn validate_source(path: &Utf8Path) -> Result<SourceFile, ValidationError> {
    if path.as_str().contains(['\n', '\r']) {
        return Err(ValidationError::LineBreakInPath);
    }

    if !path.is_file() {
        return Err(ValidationError::FileNotFound(path.to_path_buf()));
    }

    let extension = dotted_extension(path);
    if !RECOGNIZED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ValidationError::UnsupportedExtension { extension });
    }

    let directory = match path.parent() {
        Some(dir) if dir.as_str().is_empty() => Utf8Path::new("."),
        Some(dir) => dir,
        None => return Err(ValidationError::NoParentDirectory(path.to_path_buf())),
    };
    if !is_writable_dir(directory) {
        return Err(ValidationError::DirectoryNotWritable(directory.to_path_buf()));
    }

    Ok(SourceFile {
        path: path.to_path_buf(),
        extension,
    })
}

/// Whether the compiler will be able to write its output into `dir`.
fn is_writable_dir(dir: &Utf8Path) -> bool {
    match std::fs::metadata(dir) {
        Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
        Err(e) => {
            tracing::debug!("Could not read metadata of {}: {}", dir, e);
            false
        }
    }
}
