//! Read-only registry mapping model names to filesystem paths.

use crate::errors::SwapError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct RegistryFile {
    #[serde(default)]
    models: HashMap<String, String>,
}

/// Loads the registry; a missing file means no registered models.
pub async fn load_registry(path: &Path) -> Result<HashMap<String, String>, SwapError> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(HashMap::new());
    }
    let raw = tokio::fs::read_to_string(path).await?;
    let parsed: RegistryFile = serde_json::from_str(&raw).map_err(|source| SwapError::Json {
        path: path.to_owned(),
        source,
    })?;
    Ok(parsed.models)
}
