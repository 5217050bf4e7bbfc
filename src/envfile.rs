//! The shared `KEY=VALUE` environment descriptor.
//!
//! Both planes read this file: the proxy for its ports at startup, the swap
//! orchestrator for `MODEL_NAME`/`MODEL_PATH`. Updates rewrite keys in
//! place and keep comments, blank lines, and ordering intact, because the
//! same file is hand-edited and read by outside scripts.

use crate::errors::SwapError;
use crate::store::tmp_sibling;
use std::collections::{HashMap, HashSet};
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct EnvFile {
    values: HashMap<String, String>,
    lines: Vec<String>,
}

impl EnvFile {
    /// Loads the descriptor; a missing file is an empty one.
    pub async fn load(path: &Path) -> Result<Self, SwapError> {
        if !tokio::fs::try_exists(path).await? {
            return Ok(Self::default());
        }
        let raw = tokio::fs::read_to_string(path).await?;
        Ok(Self::parse(&raw))
    }

    fn parse(raw: &str) -> Self {
        let lines: Vec<String> = raw.lines().map(str::to_string).collect();
        let mut values = HashMap::new();
        for line in &lines {
            let stripped = line.trim();
            if stripped.is_empty() || stripped.starts_with('#') || !line.contains('=') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                values.insert(key.trim().to_string(), value.trim().to_string());
            }
        }
        Self { values, lines }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn port(&self, key: &str, default: u16) -> u16 {
        self.get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }
}

/// Replaces existing keys in place and appends unseen ones at the end.
/// Written via temp sibling + rename, same as the config document.
pub async fn update_env_file(path: &Path, updates: &[(&str, &str)]) -> Result<(), SwapError> {
    let current = EnvFile::load(path).await?;
    let mut out: Vec<String> = Vec::with_capacity(current.lines.len() + updates.len());
    let mut seen: HashSet<&str> = HashSet::new();

    for line in &current.lines {
        if !line.contains('=') || line.trim().starts_with('#') {
            out.push(line.clone());
            continue;
        }
        let key = line.split_once('=').map(|(k, _)| k.trim()).unwrap_or("");
        match updates.iter().find(|(k, _)| *k == key) {
            Some((k, v)) => {
                out.push(format!("{k}={v}"));
                seen.insert(k);
            }
            None => out.push(line.clone()),
        }
    }

    for (key, value) in updates {
        if !seen.contains(key) && !current.values.contains_key(*key) {
            out.push(format!("{key}={value}"));
        }
    }

    let tmp = tmp_sibling(path);
    tokio::fs::write(&tmp, out.join("\n") + "\n").await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
# ports
BACKEND_PORT=8000
PROXY_PORT=8001

MODEL_NAME=a
MODEL_PATH=/models/a
";

    #[tokio::test]
    async fn test_load_parses_values_and_skips_comments() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.env");
        std::fs::write(&path, SAMPLE).unwrap();

        let env = EnvFile::load(&path).await.unwrap();
        assert_eq!(env.get("MODEL_NAME"), Some("a"));
        assert_eq!(env.port("BACKEND_PORT", 9), 8000);
        assert_eq!(env.port("MISSING", 9), 9);
        assert_eq!(env.get("# ports"), None);
    }

    #[tokio::test]
    async fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let env = EnvFile::load(&dir.path().join("config.env")).await.unwrap();
        assert_eq!(env.get("MODEL_NAME"), None);
    }

    #[tokio::test]
    async fn test_update_preserves_comments_order_and_unrelated_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.env");
        std::fs::write(&path, SAMPLE).unwrap();

        update_env_file(&path, &[("MODEL_NAME", "b"), ("MODEL_PATH", "/models/b")])
            .await
            .unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            written,
            "\
# ports
BACKEND_PORT=8000
PROXY_PORT=8001

MODEL_NAME=b
MODEL_PATH=/models/b
"
        );
    }

    #[tokio::test]
    async fn test_update_appends_unseen_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.env");
        std::fs::write(&path, "PROXY_PORT=8001\n").unwrap();

        update_env_file(&path, &[("MODEL_NAME", "b")]).await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(written, "PROXY_PORT=8001\nMODEL_NAME=b\n");
    }

    #[tokio::test]
    async fn test_update_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.env");

        update_env_file(&path, &[("MODEL_NAME", "b")]).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "MODEL_NAME=b\n"
        );
    }
}
