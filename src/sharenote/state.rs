use crate::sharenote::paths::SharenotePaths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestState {
    pub schema_version: u32,
    pub last_pass_epoch_secs: Option<u64>,
    pub last_processed: usize,
    pub last_skipped: usize,
    pub total_processed: u64,
    pub last_error: Option<String>,
}

impl Default for IngestState {
    fn default() -> Self {
        Self {
            schema_version: 1,
            last_pass_epoch_secs: None,
            last_processed: 0,
            last_skipped: 0,
            total_processed: 0,
            last_error: None,
        }
    }
}

pub fn state_file_path(paths: &SharenotePaths) -> PathBuf {
    paths.state_dir.join("sharenote_state.json")
}

pub fn load(paths: &SharenotePaths) -> Result<IngestState> {
    let file = state_file_path(paths);
    if !file.exists() {
        return Ok(IngestState::default());
    }

    let raw =
        fs::read_to_string(&file).with_context(|| format!("failed to read {}", file.display()))?;
    let parsed: IngestState = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    Ok(parsed)
}

pub fn save(paths: &SharenotePaths, state: &IngestState) -> Result<PathBuf> {
    let file = state_file_path(paths);
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let data = serde_json::to_string_pretty(state)?;
    fs::write(&file, format!("{data}\n"))
        .with_context(|| format!("failed to write {}", file.display()))?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_loads_default_and_partial_file_fills_defaults() {
        let tmp = tempdir().expect("tempdir");
        let paths = SharenotePaths {
            home: tmp.path().to_path_buf(),
            state_dir: tmp.path().join("state"),
            logs_dir: tmp.path().join("logs"),
        };
        let fresh = load(&paths).expect("load default");
        assert_eq!(fresh.schema_version, 1);
        assert_eq!(fresh.total_processed, 0);

        fs::create_dir_all(&paths.state_dir).expect("mkdir");
        fs::write(state_file_path(&paths), "{\"total_processed\": 7}\n").expect("write");
        let partial = load(&paths).expect("load partial");
        assert_eq!(partial.total_processed, 7);
        assert!(partial.last_error.is_none());

        let mut next = partial.clone();
        next.last_processed = 2;
        save(&paths, &next).expect("save");
        assert_eq!(load(&paths).expect("reload").last_processed, 2);
    }
}
