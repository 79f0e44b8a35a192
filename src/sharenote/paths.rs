use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct SharenotePaths {
    pub home: PathBuf,
    pub state_dir: PathBuf,
    pub logs_dir: PathBuf,
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

/// Expands a leading `~/` against `home`; other paths pass through untouched.
pub fn expand_home(raw: &str, home: Option<&Path>) -> PathBuf {
    let trimmed = raw.trim();
    if trimmed == "~" {
        if let Some(home) = home {
            return home.to_path_buf();
        }
    }
    if let Some(rest) = trimmed.strip_prefix("~/") {
        if let Some(home) = home {
            return home.join(rest);
        }
    }
    PathBuf::from(trimmed)
}

pub fn resolve_paths() -> Result<SharenotePaths> {
    let home = required_home_dir()?;
    let sharenote_home = env_or_default_path("SHARENOTE_HOME", home.join(".sharenote"));

    let state_dir = env_or_default_path("SHARENOTE_STATE_DIR", sharenote_home.join("state"));
    let logs_dir = env_or_default_path("SHARENOTE_LOGS_DIR", sharenote_home.join("logs"));

    Ok(SharenotePaths {
        home: sharenote_home,
        state_dir,
        logs_dir,
    })
}
