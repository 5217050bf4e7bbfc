//! The active-model config document and its persistence primitives.
//!
//! The document is kept as an opaque `serde_json::Value`; only the
//! `model_config_list[0].config.{name,base_path}` fields are interpreted.
//! Everything else round-trips through a swap verbatim. Mutation never
//! happens in place: `build_swapped` returns a fresh document.

use crate::errors::SwapError;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const MODEL_LIST_KEY: &str = "model_config_list";

/// The name and base path extracted from the config document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveModel {
    pub name: String,
    pub base_path: String,
}

pub async fn load_document(path: &Path) -> Result<Value, SwapError> {
    if !tokio::fs::try_exists(path).await? {
        return Err(SwapError::ConfigMissing(path.to_owned()));
    }
    let raw = tokio::fs::read_to_string(path).await?;
    serde_json::from_str(&raw).map_err(|source| SwapError::Json {
        path: path.to_owned(),
        source,
    })
}

/// Extracts the single configured model, failing when the expected shape
/// (a non-empty model list whose first entry carries a config object with
/// non-empty `name` and `base_path` strings) is missing.
pub fn active_model(doc: &Value) -> Result<ActiveModel, SwapError> {
    let entry = model_entry(doc)?;
    let name = entry
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    let base_path = entry
        .get("base_path")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default();
    if name.is_empty() || base_path.is_empty() {
        return Err(SwapError::Shape(
            "model config is missing name/base_path".to_string(),
        ));
    }
    Ok(ActiveModel {
        name: name.to_string(),
        base_path: base_path.to_string(),
    })
}

fn model_entry(doc: &Value) -> Result<&Value, SwapError> {
    let first = doc
        .get(MODEL_LIST_KEY)
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .ok_or_else(|| SwapError::Shape(format!("missing {MODEL_LIST_KEY}[0]")))?;
    first
        .get("config")
        .filter(|cfg| cfg.is_object())
        .ok_or_else(|| SwapError::Shape(format!("missing {MODEL_LIST_KEY}[0].config")))
}

/// Pure transform: a new document identical to `doc` except for the model
/// name and base path. `doc` itself is never touched.
pub fn build_swapped(doc: &Value, name: &str, base_path: &str) -> Result<Value, SwapError> {
    model_entry(doc)?;

    let mut swapped = doc.clone();
    let config = swapped
        .get_mut(MODEL_LIST_KEY)
        .and_then(Value::as_array_mut)
        .and_then(|list| list.first_mut())
        .and_then(|first| first.get_mut("config"))
        .and_then(Value::as_object_mut)
        .ok_or_else(|| SwapError::Shape(format!("missing {MODEL_LIST_KEY}[0].config")))?;
    config.insert("name".to_string(), Value::String(name.to_string()));
    config.insert("base_path".to_string(), Value::String(base_path.to_string()));
    Ok(swapped)
}

/// Writes via a temporary sibling file and an atomic rename, so the target
/// is only ever observed as the full old or full new document.
pub async fn write_document_atomic(path: &Path, doc: &Value) -> Result<(), SwapError> {
    let text = serde_json::to_string_pretty(doc).map_err(|source| SwapError::Json {
        path: path.to_owned(),
        source,
    })?;
    let tmp = tmp_sibling(path);
    tokio::fs::write(&tmp, format!("{text}\n")).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

pub(crate) fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Byte-for-byte snapshot of the current document. Exactly one generation
/// is retained; each swap overwrites the previous backup.
pub async fn backup(src: &Path, dst: &Path) -> Result<(), SwapError> {
    tokio::fs::copy(src, dst).await?;
    Ok(())
}

pub async fn restore(backup: &Path, target: &Path) -> Result<(), SwapError> {
    if !tokio::fs::try_exists(backup).await? {
        return Err(SwapError::NoBackup(backup.to_owned()));
    }
    tokio::fs::copy(backup, target).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_doc() -> Value {
        json!({
            "model_config_list": [
                {
                    "config": {
                        "name": "a",
                        "base_path": "/models/a",
                        "plugin_config": {"NUM_STREAMS": "1"}
                    }
                }
            ],
            "monitoring": {"enable": false}
        })
    }

    #[tokio::test]
    async fn test_load_missing_document() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_document(&dir.path().join("config.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, SwapError::ConfigMissing(_)));
    }

    #[tokio::test]
    async fn test_load_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load_document(&path).await.unwrap_err();
        assert!(matches!(err, SwapError::Json { .. }));
    }

    #[test]
    fn test_active_model_extraction() {
        let active = active_model(&sample_doc()).unwrap();
        assert_eq!(active.name, "a");
        assert_eq!(active.base_path, "/models/a");
    }

    #[test]
    fn test_shape_errors() {
        for doc in [
            json!({}),
            json!({"model_config_list": []}),
            json!({"model_config_list": [{"config": null}]}),
            json!({"model_config_list": [{"config": {"name": "a"}}]}),
            json!({"model_config_list": [{"config": {"name": "", "base_path": "/x"}}]}),
        ] {
            assert!(
                matches!(active_model(&doc), Err(SwapError::Shape(_))),
                "expected shape error for {doc}"
            );
        }
    }

    #[test]
    fn test_build_swapped_replaces_fields_and_preserves_rest() {
        let doc = sample_doc();
        let swapped = build_swapped(&doc, "b", "/models/b").unwrap();

        let active = active_model(&swapped).unwrap();
        assert_eq!(active.name, "b");
        assert_eq!(active.base_path, "/models/b");

        // Sibling fields survive verbatim.
        assert_eq!(
            swapped["model_config_list"][0]["config"]["plugin_config"],
            json!({"NUM_STREAMS": "1"})
        );
        assert_eq!(swapped["monitoring"], json!({"enable": false}));

        // The input document is untouched.
        assert_eq!(active_model(&doc).unwrap().name, "a");
    }

    #[tokio::test]
    async fn test_atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        write_document_atomic(&path, &sample_doc()).await.unwrap();

        let reloaded = load_document(&path).await.unwrap();
        assert_eq!(active_model(&reloaded).unwrap().name, "a");
        assert!(!tmp_sibling(&path).exists());
    }

    #[tokio::test]
    async fn test_backup_and_restore_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("config.json");
        let bak = dir.path().join("config.json.bak");

        write_document_atomic(&config, &sample_doc()).await.unwrap();
        let original = std::fs::read(&config).unwrap();

        backup(&config, &bak).await.unwrap();
        write_document_atomic(&config, &build_swapped(&sample_doc(), "b", "/models/b").unwrap())
            .await
            .unwrap();
        restore(&bak, &config).await.unwrap();

        assert_eq!(std::fs::read(&config).unwrap(), original);
    }

    #[tokio::test]
    async fn test_restore_without_backup() {
        let dir = tempfile::tempdir().unwrap();
        let err = restore(
            &dir.path().join("config.json.bak"),
            &dir.path().join("config.json"),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SwapError::NoBackup(_)));
    }
}
