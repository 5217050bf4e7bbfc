//! Advisory filesystem lock serializing swap operations.
//!
//! Existence of the marker file means the lock is held; its content is the
//! owner pid, for diagnostics only. The lock is cooperative: competing swap
//! operations respect it, nothing enforces it at the kernel level. A crash
//! before release leaves a stale marker that must be cleared by hand.

use crate::errors::SwapError;
use crate::retry::poll_until;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Clone)]
pub struct FileLock {
    path: PathBuf,
    poll_interval: Duration,
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Attempts an exclusive create of the marker, retrying on a fixed
    /// interval until `timeout` elapses.
    ///
    /// The returned guard removes the marker when dropped, so release
    /// happens on every exit path including early returns and panics.
    pub async fn acquire(&self, timeout: Duration) -> Result<LockGuard, SwapError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let path = &self.path;
        let acquired = poll_until(timeout, self.poll_interval, || async move {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(mut file) => {
                    if let Err(e) = write!(file, "{}", std::process::id()) {
                        warn!(path = %path.display(), error = %e, "failed to record lock owner");
                    }
                    Ok(Some(()))
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
                Err(e) => Err(SwapError::Io(e)),
            }
        })
        .await?;

        match acquired {
            Some(()) => {
                debug!(path = %self.path.display(), "acquired swap lock");
                Ok(LockGuard {
                    path: self.path.clone(),
                })
            }
            None => Err(SwapError::LockTimeout {
                path: self.path.clone(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

/// Holds the lock; dropping it releases. Removal errors are swallowed,
/// release is best-effort cleanup.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove lock marker");
            }
        }
    }
}
