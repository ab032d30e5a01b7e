//! Named, cross-process exclusive locks backed by `flock` on files.
//!
//! Workers of one run share a lock directory. A lock name maps to one file;
//! holding the lock means holding an exclusive advisory lock on that file.
//! The lock is released when the guard drops or the process dies.

use faultline_ids::{hash_hex, sanitize};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const RETRY_INTERVAL: Duration = Duration::from_millis(50);
const NAME_MAX: usize = 64;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock directory {path}: {source}")]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("lock file {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Hands out named locks under one directory.
#[derive(Clone, Debug)]
pub struct LockManager {
    dir: PathBuf,
    retry_interval: Duration,
}

/// Held lock. Dropping it releases the lock.
#[derive(Debug)]
pub struct NamedLockGuard {
    name: String,
    path: PathBuf,
    file: File,
}

impl NamedLockGuard {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for NamedLockGuard {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(lock = %self.name, error = %e, "failed to release lock");
        } else {
            debug!(lock = %self.name, "lock released");
        }
    }
}

impl LockManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            retry_interval: RETRY_INTERVAL,
        }
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `name`: sanitized prefix plus a hash of the full name,
    /// so distinct names never share a file.
    pub fn lock_path(&self, name: &str) -> PathBuf {
        let mut prefix = sanitize(name);
        prefix.truncate(NAME_MAX);
        let digest = hash_hex([name]);
        self.dir.join(format!("{prefix}-{}.lock", &digest[..16]))
    }

    /// Wait up to `timeout` for the lock. `Ok(None)` means it timed out.
    ///
    /// A zero timeout makes a single attempt.
    pub fn acquire(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<Option<NamedLockGuard>, LockError> {
        fs::create_dir_all(&self.dir).map_err(|source| LockError::Dir {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.lock_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::File {
                path: path.clone(),
                source,
            })?;

        let start = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {
                    debug!(lock = name, waited_ms = start.elapsed().as_millis() as u64, "lock acquired");
                    return Ok(Some(NamedLockGuard {
                        name: name.to_string(),
                        path,
                        file,
                    }));
                }
                Err(err) if is_contended(&err) => {
                    let elapsed = start.elapsed();
                    if elapsed >= timeout {
                        warn!(lock = name, timeout_ms = timeout.as_millis() as u64, "timed out waiting for lock");
                        return Ok(None);
                    }
                    thread::sleep(self.retry_interval.min(timeout - elapsed));
                }
                Err(source) => return Err(LockError::File { path, source }),
            }
        }
    }

    /// Run `f` while holding `name`. `None` when the lock timed out and `f` did not run.
    pub fn with_lock<T>(
        &self,
        name: &str,
        timeout: Duration,
        f: impl FnOnce() -> T,
    ) -> Result<Option<T>, LockError> {
        match self.acquire(name, timeout)? {
            Some(_guard) => Ok(Some(f())),
            None => Ok(None),
        }
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
