use super::{Cache, LOG_TARGET};
use crate::Result;
use crate::github::Repository;
use crate::manifest::Manifest;
use fs4::fs_std::FileExt;
use ohno::IntoAppError;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const REPOSITORIES_FILE: &str = "repositories.json";
const MANIFESTS_FILE: &str = "manifests.json";
const LOCK_FILE: &str = "cache.lock";

/// The caches shared by every component during one run.
///
/// A store opened on a directory holds an exclusive advisory lock on it until
/// dropped, so two runs never interleave writes to the same cache files.
#[derive(Debug)]
pub struct CacheStore {
    dir: Option<PathBuf>,
    repositories: Arc<Cache<Repository>>,
    manifests: Arc<Cache<Manifest>>,
    lock: Option<File>,
}

impl CacheStore {
    /// Caches that live only in memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            repositories: Arc::new(Cache::new()),
            manifests: Arc::new(Cache::new()),
            lock: None,
        }
    }

    /// Lock `dir` and load whatever caches a previous run left there.
    pub async fn open(dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .into_app_err_with(|| format!("creating cache directory '{}'", dir.display()))?;

        let lock_path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .into_app_err_with(|| format!("opening cache lock file at '{}'", lock_path.display()))?;

        // Another run may hold the lock for a long time
        let file = tokio::task::spawn_blocking(move || {
            file.lock_exclusive()
                .into_app_err_with(|| format!("acquiring exclusive lock on cache at '{}'", lock_path.display()))?;
            log::debug!(target: LOG_TARGET, "Acquired cache lock at '{}'", lock_path.display());
            Ok::<_, ohno::AppError>(file)
        })
        .await
        .into_app_err("lock task panicked")??;

        Ok(Self {
            dir: Some(dir.to_path_buf()),
            repositories: Arc::new(Cache::load(&dir.join(REPOSITORIES_FILE))),
            manifests: Arc::new(Cache::load(&dir.join(MANIFESTS_FILE))),
            lock: Some(file),
        })
    }

    #[must_use]
    pub fn repositories(&self) -> Arc<Cache<Repository>> {
        Arc::clone(&self.repositories)
    }

    #[must_use]
    pub fn manifests(&self) -> Arc<Cache<Manifest>> {
        Arc::clone(&self.manifests)
    }

    /// Write the caches back to disk. Does nothing for an in-memory store.
    pub fn persist(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        self.repositories.save(&dir.join(REPOSITORIES_FILE))?;
        self.manifests.save(&dir.join(MANIFESTS_FILE))
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        if let Some(file) = &self.lock
            && let Err(e) = FileExt::unlock(file)
        {
            log::warn!(target: LOG_TARGET, "Could not unlock cache: {e:#}");
        }
    }
}
