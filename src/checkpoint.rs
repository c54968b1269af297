//! Durable storage for [`OptimizerState`] between iterations.

use crate::error::CheckpointError;
use crate::optimization::OptimizerState;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Where a run persists its state at every iteration boundary.
pub trait CheckpointStore: Send + Sync {
    fn save(&self, state: &OptimizerState) -> Result<(), CheckpointError>;

    /// Latest saved state, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<OptimizerState>, CheckpointError>;
}

/// Keeps the latest checkpoint as JSON in memory.
#[derive(Debug, Default)]
pub struct MemoryCheckpoint {
    json: Mutex<Option<String>>,
}

impl MemoryCheckpoint {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw JSON of the latest checkpoint.
    pub fn snapshot(&self) -> Option<String> {
        self.json
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl CheckpointStore for MemoryCheckpoint {
    fn save(&self, state: &OptimizerState) -> Result<(), CheckpointError> {
        let json = state.to_json()?;
        *self.json.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(json);
        Ok(())
    }

    fn load(&self) -> Result<Option<OptimizerState>, CheckpointError> {
        self.snapshot()
            .map(|json| OptimizerState::from_json(&json))
            .transpose()
    }
}

/// JSON checkpoint on disk.
///
/// Each save goes to a temporary sibling first and is then renamed over the
/// target, so a crash mid-write leaves the previous checkpoint intact.
#[derive(Clone, Debug)]
pub struct FileCheckpoint {
    path: PathBuf,
}

impl FileCheckpoint {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CheckpointStore for FileCheckpoint {
    fn save(&self, state: &OptimizerState) -> Result<(), CheckpointError> {
        let tmp = self.temp_path();
        fs::write(&tmp, state.to_json()?)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), iteration = state.iteration, "checkpoint written");
        Ok(())
    }

    fn load(&self) -> Result<Option<OptimizerState>, CheckpointError> {
        match fs::read_to_string(&self.path) {
            Ok(json) => Ok(Some(OptimizerState::from_json(&json)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AdamSettings, AlgorithmSettings, RunConfig};

    fn state() -> OptimizerState {
        let config = RunConfig::new(vec![0.25, -1.5], AlgorithmSettings::Adam(AdamSettings::default()));
        let mut state = OptimizerState::initial(&config);
        state.iteration = 3;
        state.position = vec![0.1 + 0.2, -1.0 / 7.0];
        state
    }

    fn unique_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("reoptimize-{tag}-{}.json", std::process::id()))
    }

    #[test]
    fn memory_store_starts_empty_and_round_trips() {
        let store = MemoryCheckpoint::new();
        assert!(store.load().unwrap().is_none());

        store.save(&state()).unwrap();
        assert_eq!(store.load().unwrap(), Some(state()));
    }

    #[test]
    fn file_store_round_trips_and_overwrites() {
        let path = unique_path("round-trip");
        let store = FileCheckpoint::new(&path);
        assert!(store.load().unwrap().is_none());

        let mut first = state();
        store.save(&first).unwrap();
        first.iteration = 4;
        store.save(&first).unwrap();

        assert_eq!(store.load().unwrap(), Some(first));
        assert!(!store.temp_path().exists());
        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn corrupt_file_is_a_serde_error() {
        let path = unique_path("corrupt");
        fs::write(&path, "{ not json").unwrap();

        let err = FileCheckpoint::new(&path).load().unwrap_err();
        assert!(matches!(err, CheckpointError::Serde(_)));
        fs::remove_file(&path).unwrap();
    }
}
