use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use log::debug;
use tempfile::NamedTempFile;

use crate::ledger::LedgerState;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("state file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("state file {path} is not valid ledger JSON: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Committed ledger state persisted as pretty JSON.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> Result<LedgerState, StoreError> {
        let bytes = fs::read(&self.path).map_err(|source| self.io_error(source))?;
        let state: LedgerState =
            serde_json::from_slice(&bytes).map_err(|source| self.json_error(source))?;
        debug!(
            "loaded state at height {} from {}",
            state.meta.height,
            self.path.display()
        );
        Ok(state)
    }

    /// Writes to a sibling temporary file and renames it over the target. The
    /// temporary file is removed if any step fails.
    pub fn save(&self, state: &LedgerState) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(state).map_err(|source| self.json_error(source))?;
        let dir = self.ensure_parent()?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|source| self.io_error(source))?;
        tmp.write_all(&json)
            .and_then(|()| tmp.as_file().sync_all())
            .map_err(|source| self.io_error(source))?;
        tmp.persist(&self.path)
            .map_err(|err| self.io_error(err.error))?;
        debug!(
            "saved state at height {} to {}",
            state.meta.height,
            self.path.display()
        );
        Ok(())
    }

    /// Runs `f` while holding an exclusive lock on `<state>.lock`.
    ///
    /// Every load-submit-save cycle must run inside this, otherwise two
    /// processes can both load the same height and the later save drops the
    /// earlier commit.
    pub fn with_lock<T>(&self, f: impl FnOnce() -> T) -> Result<T, StoreError> {
        self.ensure_parent()?;
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .map_err(|source| self.io_error(source))?;
        let mut lock = fd_lock::RwLock::new(file);
        let _guard = lock.write().map_err(|source| self.io_error(source))?;
        debug!("locked {}", self.lock_path().display());
        Ok(f())
    }

    fn lock_path(&self) -> PathBuf {
        let mut path = self.path.clone().into_os_string();
        path.push(".lock");
        PathBuf::from(path)
    }

    fn ensure_parent(&self) -> Result<&Path, StoreError> {
        match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
                Ok(parent)
            }
            None => Ok(Path::new(".")),
        }
    }

    fn io_error(&self, source: io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    fn json_error(&self, source: serde_json::Error) -> StoreError {
        StoreError::Json {
            path: self.path.display().to_string(),
            source,
        }
    }
}
