//! Scoped exclusive lock over a key directory.
//!
//! Several processes may start against the same empty key directory. The
//! check-then-generate step runs while holding an OS-level exclusive lock
//! on `<dir>/.keywarden.lock`, so the first process generates and every
//! later one blocks and then loads what it wrote. A directory that already
//! holds both key files is never locked.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tracing::{debug, warn};

use crate::error::KeyInitializationError;

/// Name of the lock file created inside the key directory.
pub const LOCK_FILE: &str = ".keywarden.lock";

/// Exclusive lock on a key directory, released on drop.
#[derive(Debug)]
pub struct KeyDirLock {
    file: File,
    path: PathBuf,
}

impl KeyDirLock {
    /// Block until the directory lock is held. Creates `dir` if needed.
    pub fn acquire(dir: &Path) -> Result<Self, KeyInitializationError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);

        // The lock file carries no data; never truncate it under another holder.
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        FileExt::lock_exclusive(&file).map_err(|source| KeyInitializationError::Lock {
            path: path.clone(),
            source,
        })?;

        debug!(lock_path = %path.display(), "Key directory lock acquired");
        Ok(Self { file, path })
    }

    /// Try to take the lock without blocking.
    ///
    /// Returns `Ok(None)` when another holder has it.
    pub fn try_acquire(dir: &Path) -> Result<Option<Self>, KeyInitializationError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE);

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)?;

        match FileExt::try_lock_exclusive(&file) {
            Ok(true) => {
                debug!(lock_path = %path.display(), "Key directory lock acquired");
                Ok(Some(Self { file, path }))
            }
            Ok(false) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(source) => Err(KeyInitializationError::Lock { path, source }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for KeyDirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(lock_path = %self.path.display(), error = %e, "Failed to release key directory lock");
        } else {
            debug!(lock_path = %self.path.display(), "Key directory lock released");
        }
    }
}
