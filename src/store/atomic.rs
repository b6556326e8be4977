//! Crash-safe JSON files.
//!
//! Writes go to a uniquely named temp sibling, are fsynced, then renamed
//! over the target, so readers see either the old or the new file and never
//! a partial one. Reads never fail: a missing file yields the default value
//! and an unparsable one is moved aside before the default is used.

use crate::error::{NudgeError, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// How a tolerant read obtained its value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// Parsed from disk.
    Loaded,
    /// No file yet.
    Missing,
    /// File was unparsable and has been renamed to the given path.
    Quarantined(PathBuf),
    /// File could not be read or moved aside; left in place.
    Unreadable,
}

/// A fully written and synced temp file waiting to replace its target.
///
/// Dropping it without [`commit`](Self::commit) leaves the target untouched.
#[derive(Debug)]
pub struct StagedWrite {
    temp_path: PathBuf,
    target: PathBuf,
}

impl StagedWrite {
    /// Temp file holding the new content.
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Atomically replace the target with the staged content.
    pub fn commit(self) -> Result<()> {
        if let Err(e) = std::fs::rename(&self.temp_path, &self.target) {
            let _ = std::fs::remove_file(&self.temp_path);
            return Err(NudgeError::Store(format!(
                "failed to rename '{}' to '{}': {e}",
                self.temp_path.display(),
                self.target.display()
            )));
        }
        Ok(())
    }
}

/// Serialize `value` as pretty JSON into a synced temp sibling of `path`.
pub fn stage_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<StagedWrite> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            NudgeError::Store(format!(
                "failed to create directory '{}': {e}",
                parent.display()
            ))
        })?;
    }

    let json = serde_json::to_vec_pretty(value)?;
    let temp_path = temp_sibling(path);

    let written = std::fs::File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(&json)?;
            file.sync_all()
        })
        .map_err(|e| {
            NudgeError::Store(format!(
                "failed to write temp file '{}': {e}",
                temp_path.display()
            ))
        });

    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }

    Ok(StagedWrite {
        temp_path,
        target: path.to_path_buf(),
    })
}

/// Write `value` to `path` atomically (temp file → fsync → rename).
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    stage_json(path, value)?.commit()
}

/// Read JSON from `path`, falling back to `T::default()` on any problem.
pub fn load_json_or_default<T: DeserializeOwned + Default>(path: &Path) -> (T, LoadStatus) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return (T::default(), LoadStatus::Missing);
        }
        Err(e) => {
            warn!("cannot read {}, using empty state: {e}", path.display());
            return (T::default(), LoadStatus::Unreadable);
        }
    };

    match serde_json::from_slice::<T>(&bytes) {
        Ok(value) => (value, LoadStatus::Loaded),
        Err(parse_err) => {
            let quarantine = quarantine_path(path);
            match std::fs::rename(path, &quarantine) {
                Ok(()) => {
                    warn!(
                        "malformed state in {} ({parse_err}); moved to {} and starting empty",
                        path.display(),
                        quarantine.display()
                    );
                    (T::default(), LoadStatus::Quarantined(quarantine))
                }
                Err(e) => {
                    warn!(
                        "malformed state in {} ({parse_err}) and quarantine failed: {e}",
                        path.display()
                    );
                    (T::default(), LoadStatus::Unreadable)
                }
            }
        }
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".tmp.{}", &suffix[..8]));
    let temp = path.with_file_name(name);
    debug!("staging write via {}", temp.display());
    temp
}

fn quarantine_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".corrupt-{}", chrono::Utc::now().timestamp_millis()));
    path.with_file_name(name)
}
