//! Append-only audit log of swap operations, one JSON record per line.

use crate::errors::SwapError;
use serde_json::{Map, Value, json};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;

/// Appends `{"ts": <epoch-seconds>, "event": ..., ...context}` to the log,
/// creating parent directories on first use.
pub async fn append_event(path: &Path, event: &str, context: Value) -> Result<(), SwapError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    let mut record = Map::new();
    record.insert("ts".to_string(), json!(ts));
    record.insert("event".to_string(), json!(event));
    if let Value::Object(fields) = context {
        record.extend(fields);
    }

    let mut file = tokio::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .await?;
    file.write_all(format!("{}\n", Value::Object(record)).as_bytes())
        .await?;
    file.flush().await?;
    Ok(())
}
