//! Error taxonomy for the control plane.
//!
//! Every mutating swap operation either completes or restores the previous
//! state before one of these is returned; callers never observe a
//! half-applied config.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    #[error("model config not found: {0}")]
    ConfigMissing(PathBuf),

    #[error("malformed model config: {0}")]
    Shape(String),

    #[error("unknown model '{0}': not in the registry and no --path given")]
    UnknownModel(String),

    #[error("model path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("could not acquire swap lock at {path} within {timeout_secs}s")]
    LockTimeout { path: PathBuf, timeout_secs: u64 },

    #[error("no backup found at {0}")]
    NoBackup(PathBuf),

    #[error("model '{model}' did not become ready within {timeout_secs}s; rolled back")]
    SwapTimeout { model: String, timeout_secs: u64 },

    #[error("rollback verification failed: {0}")]
    RollbackVerify(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}
