//! Cross-process database lock
//!
//! The lock is an advisory `flock`/`LockFileEx` lock on a sidecar file next to
//! the database (`<db-path>.lock`). Its content is never read. The OS drops
//! the lock when the holding process exits, so a crashed writer cannot wedge
//! the file forever; a slow writer can still hold it, hence the timeout.

use crate::error::{PipelineError, Result};
use fs2::FileExt;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(250);

/// Sidecar lock path for a database file: `<db-path>.lock`
pub fn lock_path_for(db_path: &Path) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// Exclusive hold on a database's lock file, released on drop
#[derive(Debug)]
pub struct DbLock {
    file: File,
    path: PathBuf,
    acquired_at: Instant,
}

impl DbLock {
    /// Block until the lock for `db_path` is held or `timeout` elapses.
    ///
    /// A zero timeout makes a single attempt.
    pub fn acquire(db_path: &Path, timeout: Duration) -> Result<Self> {
        let path = lock_path_for(db_path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let started = Instant::now();
        let mut backoff = INITIAL_BACKOFF;
        let mut reported = false;

        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    let waited = started.elapsed();
                    debug!(lock = %path.display(), waited_ms = waited.as_millis() as u64, "Database lock acquired");
                    return Ok(Self {
                        file,
                        path,
                        acquired_at: Instant::now(),
                    });
                },
                Err(e) if is_contended(&e) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(PipelineError::LockTimeout {
                            lock_path: path,
                            waited,
                        });
                    }
                    if !reported {
                        warn!(lock = %path.display(), "Database lock is held by another writer, waiting");
                        reported = true;
                    }
                    std::thread::sleep(backoff.min(timeout - waited));
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                },
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Single non-blocking attempt; `None` when another holder has it
    pub fn try_acquire(db_path: &Path) -> Result<Option<Self>> {
        match Self::acquire(db_path, Duration::ZERO) {
            Ok(lock) => Ok(Some(lock)),
            Err(e) if e.is_lock_timeout() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DbLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!(lock = %self.path.display(), error = %e, "Failed to release database lock explicitly");
        }
        debug!(
            lock = %self.path.display(),
            held_ms = self.acquired_at.elapsed().as_millis() as u64,
            "Database lock released"
        );
    }
}

fn is_contended(err: &std::io::Error) -> bool {
    err.kind() == std::io::ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
