//! Defeated detection through a sentinel file
//!
//! While the player is defeated the game keeps a designated audio file open
//! without sharing. If we can open it exclusively, nobody holds it.

use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use tracing::trace;

pub trait LockProbe: Send + Sync {
    /// Whether the sentinel is currently held. Failures report `false`.
    fn is_locked(&self) -> bool;
}

/// Probe that never reports a lock, used when no sentinel is configured
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverLocked;

impl LockProbe for NeverLocked {
    fn is_locked(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone)]
pub struct FileLockProbe {
    path: PathBuf,
}

impl FileLockProbe {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(windows)]
    fn open_exclusive(&self) -> io::Result<std::fs::File> {
        use std::os::windows::fs::OpenOptionsExt;
        OpenOptions::new().read(true).share_mode(0).open(&self.path)
    }

    #[cfg(not(windows))]
    fn open_exclusive(&self) -> io::Result<std::fs::File> {
        // No mandatory locking here, so an open only proves the file exists
        OpenOptions::new().read(true).open(&self.path)
    }
}

/// ERROR_SHARING_VIOLATION and ERROR_LOCK_VIOLATION
fn is_lock_violation(err: &io::Error) -> bool {
    cfg!(windows) && matches!(err.raw_os_error(), Some(32 | 33))
}

impl LockProbe for FileLockProbe {
    fn is_locked(&self) -> bool {
        match self.open_exclusive() {
            Ok(_) => false,
            Err(e) if is_lock_violation(&e) => true,
            Err(e) => {
                trace!(path = %self.path.display(), error = %e, "lock probe failed");
                false
            }
        }
    }
}
