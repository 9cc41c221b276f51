//! File utilities for safe and robust file operations.
//!
//! Source reading with lossy UTF-8 fallback and binary detection, atomic JSON
//! writes (temp file then rename) and POSIX path normalization.

use std::fs;
use std::io::Read;
use std::path::{Component, Path};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::core::errors::{PulseError, Result};

/// Safe file reading with UTF-8 validation and fallback handling
pub struct FileReader;

impl FileReader {
    /// Read a file to string, handling non-UTF-8 files gracefully
    pub fn read_to_string(file_path: &Path) -> Result<String> {
        if Self::is_likely_binary(file_path)? {
            return Err(PulseError::validation(format!(
                "File appears to be binary: {}",
                file_path.display()
            )));
        }

        match fs::read_to_string(file_path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::InvalidData => {
                let bytes = fs::read(file_path)
                    .map_err(|err| PulseError::io("Failed to read file as bytes", err))?;
                warn!(
                    "File contained invalid UTF-8, converted with lossy encoding: {}",
                    file_path.display()
                );
                Ok(String::from_utf8_lossy(&bytes).into_owned())
            }
            Err(e) => Err(PulseError::io(
                format!("Failed to read file: {}", file_path.display()),
                e,
            )),
        }
    }

    /// Sample the first few kilobytes for NUL bytes.
    pub fn is_likely_binary(file_path: &Path) -> Result<bool> {
        let mut file = fs::File::open(file_path).map_err(|e| {
            PulseError::io(format!("Failed to open file: {}", file_path.display()), e)
        })?;
        let mut buffer = [0u8; 8192];
        let read = file
            .read(&mut buffer)
            .map_err(|e| PulseError::io("Failed to sample file", e))?;
        Ok(buffer[..read].contains(&0))
    }
}

/// Serialize `value` as JSON to `path` atomically.
///
/// The payload is written to a sibling `.tmp` file and renamed into place, so
/// readers observe either the previous file or the complete new one.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            PulseError::io(
                format!("Failed to create directory: {}", parent.display()),
                e,
            )
        })?;
    }

    let temp_path = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4().simple()));
    let content = serde_json::to_vec(value)?;

    fs::write(&temp_path, content).map_err(|e| {
        PulseError::io(format!("Failed to write file: {}", temp_path.display()), e)
    })?;

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        PulseError::io(format!("Failed to rename file: {}", path.display()), e)
    })
}

/// Read a JSON file, returning `None` when it does not exist.
pub fn read_json_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PulseError::io(
            format!("Failed to read file: {}", path.display()),
            e,
        )),
    }
}

/// Collapse `.` and `..` segments of a `/`-separated path.
///
/// Returns `None` when `..` would climb above the root.
pub fn normalize_posix_path(path: &str) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    for component in Path::new(path).components() {
        match component {
            Component::CurDir | Component::RootDir | Component::Prefix(_) => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::Normal(part) => parts.push(part.to_string_lossy().into_owned()),
        }
    }
    Some(parts.join("/"))
}

/// Directory part of a `/`-separated path, `""` for top-level files.
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Join two `/`-separated fragments, skipping empty ones.
pub fn join_posix(base: &str, rest: &str) -> String {
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}/{rest}"),
    }
}
