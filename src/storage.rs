//! Storage layout and atomic file I/O for tasklog
//!
//! # Directory Structure
//!
//! ```text
//! .tasks/                       # Configurable via [store] dir
//!   tasks.jsonl                 # Active task log, one record per line
//!   archive.jsonl               # Completed and deleted tasks
//!   current.json                # Execution context (which task is running)
//! ```
//!
//! Every write goes through [`write_atomic`]: the new contents are written
//! to a temp file in the target's directory and renamed over the target,
//! so readers only ever observe the old or the new file.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Serialize};
use tempfile::NamedTempFile;

use crate::config::StoreConfig;
use crate::error::Result;

/// Resolved paths for one repository's task state
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
    config: StoreConfig,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>, config: StoreConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    /// Storage with the default layout under `root`
    pub fn for_root(root: impl Into<PathBuf>) -> Self {
        Self::new(root, StoreConfig::default())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path to the `.tasks/` directory
    pub fn tasks_dir(&self) -> PathBuf {
        self.root.join(&self.config.dir)
    }

    /// Path to the active task log
    pub fn active_log(&self) -> PathBuf {
        self.tasks_dir().join(&self.config.active)
    }

    /// Path to the archive log
    pub fn archive_log(&self) -> PathBuf {
        self.tasks_dir().join(&self.config.archive)
    }

    /// Path to the execution context file
    pub fn context_file(&self) -> PathBuf {
        self.tasks_dir().join(&self.config.context)
    }

    /// Log files that a task mutation may touch, relative to the root
    pub fn log_files(&self) -> Vec<PathBuf> {
        vec![
            Path::new(&self.config.dir).join(&self.config.active),
            Path::new(&self.config.dir).join(&self.config.archive),
        ]
    }
}

/// Write `data` to a temp file next to `path`, flushed but not yet visible.
///
/// Dropping the returned handle without calling [`NamedTempFile::persist`]
/// removes the temp file and leaves `path` untouched.
pub fn stage(path: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;

    let mut temp = NamedTempFile::new_in(&parent)?;
    temp.write_all(data)?;
    temp.as_file().sync_all()?;
    Ok(temp)
}

/// Atomically replace `path` with `data` (temp file + rename).
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp = stage(path, data)?;
    temp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

/// Write JSON data atomically
pub fn write_json<T: Serialize>(path: &Path, data: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(data)?;
    write_atomic(path, json.as_bytes())
}

/// Read JSON data, `None` when the file does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

/// Read a file's lines; a missing file reads as empty.
///
/// Bytes that are not valid UTF-8 are replaced rather than failing the
/// whole read, so one corrupted line cannot hide the rest of the log.
pub fn read_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    Ok(String::from_utf8_lossy(&bytes)
        .lines()
        .map(str::to_string)
        .collect())
}

/// Remove a file, treating a missing file as already removed
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}
