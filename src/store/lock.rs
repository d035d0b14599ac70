//! Exclusive ownership of a state directory.
//!
//! The tracker must be the only writer of the open-session slot and the
//! history. Every process that builds a tracker over a directory holds this
//! lock for as long as the tracker lives; a second process is refused
//! instead of writing next to it. The OS releases the lock when the holder
//! exits, so a crash never leaves the directory locked.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Lock file name inside the state directory.
pub const LOCK_FILE_NAME: &str = "tracker.lock";

/// Errors acquiring the state lock.
#[derive(Debug)]
pub enum LockError {
    /// Another process owns the directory
    Held { pid: Option<u32> },
    Io(String),
}

impl std::fmt::Display for LockError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockError::Held { pid: Some(pid) } => {
                write!(f, "Session state is in use by another process (pid {pid})")
            }
            LockError::Held { pid: None } => {
                write!(f, "Session state is in use by another process")
            }
            LockError::Io(e) => write!(f, "Lock error: {e}"),
        }
    }
}

impl std::error::Error for LockError {}

impl From<std::io::Error> for LockError {
    fn from(e: std::io::Error) -> Self {
        LockError::Io(e.to_string())
    }
}

/// Held lock on a state directory. Released on drop.
#[derive(Debug)]
pub struct StateLock {
    file: File,
    path: PathBuf,
}

impl StateLock {
    /// Take the lock without waiting.
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(LOCK_FILE_NAME);

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            let mut content = String::new();
            let pid = file
                .read_to_string(&mut content)
                .ok()
                .and_then(|_| content.trim().parse().ok());
            return Err(LockError::Held { pid });
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        tracing::debug!(path = ?path, "Acquired state lock");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StateLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
