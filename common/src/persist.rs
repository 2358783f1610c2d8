//! JSON snapshot files for the small keyed tables that must survive restarts

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::error;

/// Load a `{key: value}` JSON object. A missing file is an empty table.
pub fn load_json_map<T: DeserializeOwned>(path: &Path) -> Result<BTreeMap<String, T>> {
    if !path.exists() {
        return Ok(BTreeMap::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(BTreeMap::new());
    }
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Like [`load_json_map`], but an unreadable snapshot never stops startup.
/// The bad file is moved aside to `<name>.corrupt` so the next flush does not
/// overwrite it, and the table starts empty.
pub fn load_json_map_or_empty<T: DeserializeOwned>(path: &Path) -> BTreeMap<String, T> {
    match load_json_map(path) {
        Ok(table) => table,
        Err(e) => {
            let aside = path.with_extension("json.corrupt");
            error!("Starting with an empty table: {:#}", e);
            match std::fs::rename(path, &aside) {
                Ok(()) => error!("Moved unreadable snapshot to {}", aside.display()),
                Err(e) => error!("Failed to move {} aside: {}", path.display(), e),
            }
            BTreeMap::new()
        }
    }
}

/// Write a snapshot through a sibling temp file and rename it into place so a
/// crash mid-write never leaves a truncated file behind.
pub async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_vec_pretty(value).context("Failed to serialize snapshot")?;
    let tmp = path.with_extension("json.tmp");
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tokio::fs::write(&tmp, body)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Failed to move snapshot into {}", path.display()))?;
    Ok(())
}
