// Cache path utilities.
// Constructs filesystem paths for the stash hierarchy: base dir, function, digest, entry.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

/// Application name used for the default cache directory.
pub const APP_NAME: &str = "bamboo-stash";

/// File extension of stored entries.
pub const ENTRY_EXTENSION: &str = "json";

/// Get the default base directory (~/.cache/bamboo-stash on Linux).
pub fn default_base_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.cache_dir().to_path_buf())
}

/// Path to the directory holding every version of a function's results.
pub fn function_root(base_dir: &Path, qualname: &str) -> PathBuf {
    base_dir.join(sanitize_name(qualname))
}

/// Path to the directory holding results for one version of a function.
pub fn function_dir(base_dir: &Path, qualname: &str, source_digest: &str) -> PathBuf {
    function_root(base_dir, qualname).join(source_digest)
}

/// Path to a single stored result.
pub fn entry_path(function_dir: &Path, args_digest: &str) -> PathBuf {
    function_dir.join(format!("{}.{}", args_digest, ENTRY_EXTENSION))
}

/// Sanitize a name for use in filesystem paths.
/// Replaces problematic characters with underscores.
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            _ => c,
        })
        .collect()
}
