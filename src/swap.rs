//! The control-plane orchestrator: one `switch` or `rollback` at a time,
//! serialized system-wide by the advisory lock, with a backup written
//! before every mutation and an automatic restore when the backend never
//! reports the new model as ready.

use crate::audit;
use crate::envfile::update_env_file;
use crate::errors::SwapError;
use crate::lock::FileLock;
use crate::probe::ReadinessProbe;
use crate::registry::load_registry;
use crate::retry::poll_until;
use crate::store::{self, ActiveModel};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

const LOCK_TIMEOUT: Duration = Duration::from_secs(15);
const READY_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Filesystem layout of the control plane, relative to a project root.
#[derive(Debug, Clone)]
pub struct SwapPaths {
    pub root: PathBuf,
    pub env_file: PathBuf,
    pub config_json: PathBuf,
    pub backup_json: PathBuf,
    pub lock_file: PathBuf,
    pub registry_file: PathBuf,
    pub audit_log: PathBuf,
}

impl SwapPaths {
    pub fn new(root: &Path) -> Self {
        let run = root.join("run");
        Self {
            root: root.to_owned(),
            env_file: root.join("config.env"),
            config_json: root.join("config.json"),
            backup_json: root.join("config.json.bak"),
            lock_file: run.join("swap.lock"),
            registry_file: run.join("models_registry.json"),
            audit_log: run.join("swaps.log"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SwitchOptions {
    /// Explicit model path, overriding the registry.
    pub path: Option<String>,
    /// How long to wait for the backend to report the model as ready.
    pub timeout: Duration,
    /// Apply the config without waiting for readiness.
    pub no_wait: bool,
    /// Report the plan without touching any file.
    pub dry_run: bool,
}

impl Default for SwitchOptions {
    fn default() -> Self {
        Self {
            path: None,
            timeout: Duration::from_secs(180),
            no_wait: false,
            dry_run: false,
        }
    }
}

/// Structured result of a `switch` call.
#[derive(Debug, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SwitchOutcome {
    Unchanged {
        op_id: String,
        changed: bool,
        model_name: String,
        model_path: String,
    },
    DryRun {
        op_id: String,
        changed: bool,
        from_model: String,
        to_model: String,
        from_path: String,
        to_path: String,
    },
    AppliedNoWait {
        op_id: String,
        changed: bool,
        model_name: String,
        model_path: String,
    },
    Ready {
        op_id: String,
        changed: bool,
        model_name: String,
        model_path: String,
    },
}

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub configured_model: String,
    pub configured_path: String,
    pub backend_port: u16,
    pub backend_reachable: bool,
    pub backend_models: Vec<String>,
    pub backend_error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RollbackOutcome {
    pub rolled_back_to: String,
    pub model_path: String,
}

pub struct SwapService<P: ReadinessProbe> {
    paths: SwapPaths,
    probe: P,
    backend_port: u16,
    lock: FileLock,
    lock_timeout: Duration,
    ready_poll: Duration,
}

impl<P: ReadinessProbe> SwapService<P> {
    pub fn new(paths: SwapPaths, probe: P, backend_port: u16) -> Self {
        let lock = FileLock::new(&paths.lock_file);
        Self {
            paths,
            probe,
            backend_port,
            lock,
            lock_timeout: LOCK_TIMEOUT,
            ready_poll: READY_POLL_INTERVAL,
        }
    }

    /// Shortens the poll/lock intervals; used by tests.
    pub fn with_intervals(mut self, ready_poll: Duration, lock_timeout: Duration) -> Self {
        self.ready_poll = ready_poll;
        self.lock_timeout = lock_timeout;
        self.lock = FileLock::new(&self.paths.lock_file).with_poll_interval(ready_poll.min(Duration::from_millis(250)));
        self
    }

    /// Known models from the registry. Lock-free read.
    pub async fn list(&self) -> Result<HashMap<String, String>, SwapError> {
        load_registry(&self.paths.registry_file).await
    }

    /// Current config plus a live readiness probe. Lock-free, mutates nothing.
    pub async fn status(&self) -> Result<StatusReport, SwapError> {
        let doc = store::load_document(&self.paths.config_json).await?;
        let active = store::active_model(&doc)?;
        let backend = self.probe.fetch_models().await;
        Ok(StatusReport {
            configured_model: active.name,
            configured_path: active.base_path,
            backend_port: self.backend_port,
            backend_reachable: backend.reachable,
            backend_models: backend.models,
            backend_error: backend.error,
        })
    }

    /// Swaps the active model, waiting for readiness unless told otherwise.
    ///
    /// Resolution and existence checks happen before any file is touched.
    /// Once the new document is written, every failure path restores the
    /// backup before returning, so a `SwapTimeout` means the previous
    /// config and env values are back in place.
    pub async fn switch(
        &self,
        model_name: &str,
        opts: SwitchOptions,
    ) -> Result<SwitchOutcome, SwapError> {
        let op_id = Uuid::new_v4().to_string();

        let registry = self.list().await?;
        let resolved = opts
            .path
            .clone()
            .or_else(|| registry.get(model_name).cloned())
            .ok_or_else(|| SwapError::UnknownModel(model_name.to_string()))?;
        if !tokio::fs::try_exists(Path::new(&resolved)).await? {
            return Err(SwapError::PathNotFound(PathBuf::from(&resolved)));
        }

        // Held for the rest of the operation; released on every exit path
        // (including the early returns below) when the guard drops.
        let _guard = self.lock.acquire(self.lock_timeout).await?;

        let doc = store::load_document(&self.paths.config_json).await?;
        let current = store::active_model(&doc)?;

        if current.name == model_name && current.base_path == resolved {
            info!(model = %model_name, "already on requested model");
            return Ok(SwitchOutcome::Unchanged {
                op_id,
                changed: false,
                model_name: model_name.to_string(),
                model_path: resolved,
            });
        }

        let planned = store::build_swapped(&doc, model_name, &resolved)?;

        if opts.dry_run {
            return Ok(SwitchOutcome::DryRun {
                op_id,
                changed: false,
                from_model: current.name,
                to_model: model_name.to_string(),
                from_path: current.base_path,
                to_path: resolved,
            });
        }

        audit::append_event(
            &self.paths.audit_log,
            "swap_started",
            json!({"op_id": op_id, "from_model": current.name, "to_model": model_name}),
        )
        .await?;

        store::backup(&self.paths.config_json, &self.paths.backup_json).await?;
        store::write_document_atomic(&self.paths.config_json, &planned).await?;
        update_env_file(
            &self.paths.env_file,
            &[("MODEL_NAME", model_name), ("MODEL_PATH", &resolved)],
        )
        .await?;

        if opts.no_wait {
            audit::append_event(
                &self.paths.audit_log,
                "swap_applied_no_wait",
                json!({"op_id": op_id, "to_model": model_name}),
            )
            .await?;
            return Ok(SwitchOutcome::AppliedNoWait {
                op_id,
                changed: true,
                model_name: model_name.to_string(),
                model_path: resolved,
            });
        }

        info!(
            model = %model_name,
            timeout_secs = opts.timeout.as_secs(),
            "waiting for backend to report model as ready"
        );
        let probe = &self.probe;
        let ready = poll_until(opts.timeout, self.ready_poll, move || async move {
            Ok::<_, SwapError>(if probe.fetch_models().await.has_model(model_name) {
                Some(())
            } else {
                None
            })
        })
        .await?;

        if ready.is_some() {
            audit::append_event(
                &self.paths.audit_log,
                "swap_ready",
                json!({"op_id": op_id, "to_model": model_name}),
            )
            .await?;
            info!(model = %model_name, "swap complete, backend ready");
            return Ok(SwitchOutcome::Ready {
                op_id,
                changed: true,
                model_name: model_name.to_string(),
                model_path: resolved,
            });
        }

        warn!(model = %model_name, "backend never became ready, rolling back");
        store::restore(&self.paths.backup_json, &self.paths.config_json).await?;
        self.verify_restored().await?;
        update_env_file(
            &self.paths.env_file,
            &[
                ("MODEL_NAME", current.name.as_str()),
                ("MODEL_PATH", current.base_path.as_str()),
            ],
        )
        .await?;
        audit::append_event(
            &self.paths.audit_log,
            "swap_rolled_back",
            json!({"op_id": op_id, "to_model": model_name, "reason": "timeout_or_not_ready"}),
        )
        .await?;

        Err(SwapError::SwapTimeout {
            model: model_name.to_string(),
            timeout_secs: opts.timeout.as_secs(),
        })
    }

    /// Restores the last backup unconditionally and re-derives the env keys
    /// from the restored document.
    pub async fn rollback(&self) -> Result<RollbackOutcome, SwapError> {
        if !tokio::fs::try_exists(&self.paths.backup_json).await? {
            return Err(SwapError::NoBackup(self.paths.backup_json.clone()));
        }

        let _guard = self.lock.acquire(self.lock_timeout).await?;

        store::restore(&self.paths.backup_json, &self.paths.config_json).await?;
        let active = self.verify_restored().await?;
        update_env_file(
            &self.paths.env_file,
            &[
                ("MODEL_NAME", active.name.as_str()),
                ("MODEL_PATH", active.base_path.as_str()),
            ],
        )
        .await?;
        audit::append_event(
            &self.paths.audit_log,
            "manual_rollback",
            json!({"to_model": active.name}),
        )
        .await?;

        Ok(RollbackOutcome {
            rolled_back_to: active.name,
            model_path: active.base_path,
        })
    }

    /// Re-reads the document after a restore; a rollback only counts as
    /// complete when the restored document round-trips.
    async fn verify_restored(&self) -> Result<ActiveModel, SwapError> {
        let doc = store::load_document(&self.paths.config_json)
            .await
            .map_err(|e| SwapError::RollbackVerify(e.to_string()))?;
        store::active_model(&doc).map_err(|e| SwapError::RollbackVerify(e.to_string()))
    }
}
