//! YAML document load/save helpers.

use crate::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Loads a whole YAML document, returning the type's default when the file
/// does not exist yet.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_document<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let contents = fs::read_to_string(path).map_err(|e| Error::OperationFailed {
        operation: "read_store".to_string(),
        cause: format!("{}: {e}", path.display()),
    })?;
    if contents.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml_ng::from_str(&contents).map_err(|e| Error::OperationFailed {
        operation: "parse_store".to_string(),
        cause: format!("{}: {e}", path.display()),
    })
}

/// Atomically rewrites a whole YAML document.
///
/// The document is serialized to a sibling temp file and renamed into
/// place, so a crash mid-write never leaves a truncated store behind.
///
/// # Errors
///
/// Returns an error if serialization or any filesystem step fails.
pub fn save_document<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let yaml = serde_yaml_ng::to_string(value).map_err(|e| Error::OperationFailed {
        operation: "serialize_store".to_string(),
        cause: e.to_string(),
    })?;

    let io_err = |e: std::io::Error| Error::OperationFailed {
        operation: "write_store".to_string(),
        cause: format!("{}: {e}", path.display()),
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let tmp = path.with_extension("yaml.tmp");
    fs::write(&tmp, yaml).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::Playbook;

    #[test]
    fn test_missing_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let playbook: Playbook = load_document(&dir.path().join("absent.yaml")).unwrap();
        assert!(playbook.bullets.is_empty());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("playbook.yaml");

        let mut playbook = Playbook::new();
        playbook.deprecated_patterns.push("abcd1234".to_string());
        save_document(&path, &playbook).unwrap();

        let loaded: Playbook = load_document(&path).unwrap();
        assert_eq!(loaded.deprecated_patterns, vec!["abcd1234"]);
        // No temp file left behind.
        assert!(!path.with_extension("yaml.tmp").exists());
    }

    #[test]
    fn test_empty_file_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.yaml");
        fs::write(&path, "").unwrap();
        let playbook: Playbook = load_document(&path).unwrap();
        assert!(playbook.bullets.is_empty());
    }
}
