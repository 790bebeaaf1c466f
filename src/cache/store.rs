// Cache store for reading and writing stashed results.
// Handles JSON serialization, atomic writes, and directory maintenance.

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tempfile::NamedTempFile;

use crate::error::Result;

use super::paths::ENTRY_EXTENSION;

/// Wrapper for a stashed result with metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StashedValue<T> {
    /// The function's return value.
    pub data: T,
    /// When the value was stored.
    pub cached_at: DateTime<Utc>,
}

impl<T> StashedValue<T> {
    /// Create a new entry stamped with the current time.
    pub fn new(data: T) -> Self {
        Self {
            data,
            cached_at: Utc::now(),
        }
    }
}

/// Read a stashed value from a file.
///
/// Missing files are `Ok(None)`. Bytes that do not decode, including invalid
/// UTF-8, are a `Json` error.
pub fn read_stashed<T: DeserializeOwned>(path: &Path) -> Result<Option<StashedValue<T>>> {
    let contents = match fs::read(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let stashed: StashedValue<T> = serde_json::from_slice(&contents)?;
    Ok(Some(stashed))
}

/// Write a value to the stash as JSON.
pub fn write_stashed<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let stashed = StashedValue::new(data);
    let json = serde_json::to_string_pretty(&stashed)?;

    // Unique temp file per writer, then rename over the entry
    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(json.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;

    Ok(())
}

/// Delete a stashed file.
pub fn delete(path: &Path) -> Result<bool> {
    if path.exists() {
        fs::remove_file(path)?;
        return Ok(true);
    }
    Ok(false)
}

/// Delete a directory and all contents.
pub fn delete_dir(path: &Path) -> Result<bool> {
    if path.exists() {
        fs::remove_dir_all(path)?;
        return Ok(true);
    }
    Ok(false)
}

/// Count stored entries directly under a directory and their total size in bytes.
pub fn dir_usage(path: &Path) -> Result<(usize, u64)> {
    if !path.is_dir() {
        return Ok((0, 0));
    }

    let mut entries = 0;
    let mut bytes = 0;
    for item in fs::read_dir(path)? {
        let item = item?;
        let item_path = item.path();
        if item_path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXTENSION) {
            continue;
        }
        let metadata = item.metadata()?;
        if metadata.is_file() {
            entries += 1;
            bytes += metadata.len();
        }
    }

    Ok((entries, bytes))
}
