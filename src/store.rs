//! File-backed response store.

use crate::cache_key::{default_path, CacheKey};
use crate::error::{FixtureError, Result};
use crate::matcher::EndpointRule;
use crate::snapshot::Snapshot;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Reads and writes snapshots under a cache directory.
#[derive(Debug, Clone)]
pub struct ResponseStore {
    cache_dir: PathBuf,
}

impl ResponseStore {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Fail unless the cache directory exists.
    pub fn ensure_cache_dir(&self) -> Result<()> {
        if self.cache_dir.is_dir() {
            Ok(())
        } else {
            Err(FixtureError::CacheDirMissing {
                path: self.cache_dir.clone(),
            })
        }
    }

    /// Load the snapshot stored under `key`.
    ///
    /// The grouped location is tried before the ungrouped one. `Ok(None)`
    /// means nothing was recorded; what that implies is up to the caller.
    pub fn load(&self, key: &CacheKey) -> Result<Option<Snapshot>> {
        self.ensure_cache_dir()?;

        for path in key.candidates() {
            if path.is_file() {
                debug!(path = %path.display(), "Loading fixture");
                return read_snapshot(path).map(Some);
            }
        }

        warn!(path = %key.path().display(), "No fixture recorded");
        Ok(None)
    }

    /// Load the `default.yml` fallback of an endpoint.
    pub fn load_default(&self, endpoint: &EndpointRule) -> Result<Snapshot> {
        self.ensure_cache_dir()?;

        let path = default_path(&self.cache_dir, endpoint.file_path());
        if !path.is_file() {
            return Err(FixtureError::MissingDefault { path });
        }
        info!(path = %path.display(), endpoint = %endpoint.label(), "Replaying default fixture");
        read_snapshot(&path)
    }

    /// Write `snapshot` under `key`, replacing any earlier recording.
    pub fn save(&self, key: &CacheKey, snapshot: &Snapshot) -> Result<()> {
        let path = key.path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| FixtureError::io(dir, e))?;
        }

        let yaml = snapshot.to_yaml().map_err(|source| FixtureError::FixtureEncode {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, yaml).map_err(|e| FixtureError::io(path, e))?;

        info!(path = %path.display(), status = snapshot.status, "Recorded fixture");
        Ok(())
    }
}

fn read_snapshot(path: &Path) -> Result<Snapshot> {
    let content = fs::read_to_string(path).map_err(|e| FixtureError::io(path, e))?;
    Snapshot::from_yaml(&content).map_err(|source| {
        error!(path = %path.display(), error = %source, "Corrupt fixture");
        FixtureError::CorruptFixture {
            path: path.to_path_buf(),
            source,
        }
    })
}
