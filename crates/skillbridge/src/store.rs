//! Variables/results files shared with the simulator.
//!
//! The bridge only names the files; reading and writing them is delegated to a
//! [`VariableStore`], so the on-disk encoding can follow whatever the simulator
//! scripts expect. [`JsonFileStore`] is the default.

use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("cannot access {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unexpected content in {}: {source}", .path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CollaboratorError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn format(path: &Path, source: serde_json::Error) -> Self {
        Self::Format {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Synchronous file collaborator. Failures are reported, never masked.
pub trait VariableStore: Send + Sync {
    /// Persist the optimizer's variables where the simulator will read them.
    fn store_variables(&self, data: &Value, path: &Path) -> Result<(), CollaboratorError>;

    /// Read the user-defined starting variables.
    fn read_variables(&self, path: &Path) -> Result<Value, CollaboratorError>;

    /// Read what the simulator wrote after a run.
    fn read_results(&self, path: &Path) -> Result<Value, CollaboratorError>;
}

/// Stores everything as JSON documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFileStore;

impl JsonFileStore {
    fn read_json(path: &Path) -> Result<Value, CollaboratorError> {
        let content = std::fs::read_to_string(path).map_err(|e| CollaboratorError::io(path, e))?;
        if content.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&content).map_err(|e| CollaboratorError::format(path, e))
    }
}

impl VariableStore for JsonFileStore {
    fn store_variables(&self, data: &Value, path: &Path) -> Result<(), CollaboratorError> {
        let json = serde_json::to_vec_pretty(data).map_err(|e| CollaboratorError::format(path, e))?;
        std::fs::write(path, json).map_err(|e| CollaboratorError::io(path, e))?;
        tracing::trace!(path = %path.display(), "Stored variables");
        Ok(())
    }

    fn read_variables(&self, path: &Path) -> Result<Value, CollaboratorError> {
        Self::read_json(path)
    }

    fn read_results(&self, path: &Path) -> Result<Value, CollaboratorError> {
        Self::read_json(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stored_variables_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vars0.ocn");
        let data = json!({"w1": 1.5, "l1": 0.18});

        JsonFileStore.store_variables(&data, &path).unwrap();

        assert_eq!(JsonFileStore.read_variables(&path).unwrap(), data);
    }

    #[test]
    fn empty_results_file_is_null() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out0.txt");
        std::fs::File::create(&path).unwrap();

        assert_eq!(JsonFileStore.read_results(&path).unwrap(), Value::Null);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonFileStore
            .read_results(&dir.path().join("missing.txt"))
            .unwrap_err();

        assert!(matches!(err, CollaboratorError::Io { .. }));
        assert!(err.to_string().contains("missing.txt"));
    }

    #[test]
    fn garbage_is_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out1.txt");
        std::fs::write(&path, "gain = 42").unwrap();

        let err = JsonFileStore.read_results(&path).unwrap_err();
        assert!(matches!(err, CollaboratorError::Format { .. }));
    }

    #[test]
    fn store_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("vars0.ocn");

        let err = JsonFileStore.store_variables(&json!({}), &path).unwrap_err();
        assert!(matches!(err, CollaboratorError::Io { .. }));
    }
}
