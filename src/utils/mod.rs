//! Common utilities and helper functions

pub mod error;

use std::io;
use std::path::Path;

/// Create the parent directory of `path` if it does not exist yet
pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

/// Path with its extension replaced, used for derived output files
pub fn with_extension(path: &Path, extension: &str) -> std::path::PathBuf {
    path.with_extension(extension)
}
