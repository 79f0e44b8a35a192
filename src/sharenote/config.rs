use crate::sharenote::clock::NoteClock;
use crate::sharenote::paths::expand_home;
use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_PERIOD_SECS: u64 = 3600;
const MAX_BASE_DEPTH: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub note_dir: String,
    pub target_file: String,
    pub note_extension: String,
    pub timezone: String,
}

fn default_note_extension() -> String {
    "txt".to_string()
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            note_dir: "~/Dropbox/shared-notes".to_string(),
            target_file: "~/Dropbox/org/journal.org".to_string(),
            note_extension: default_note_extension(),
            timezone: String::new(),
        }
    }
}

impl IngestConfig {
    pub fn note_dir_path(&self) -> PathBuf {
        expand_home(&self.note_dir, dirs::home_dir().as_deref())
    }

    pub fn target_file_path(&self) -> PathBuf {
        expand_home(&self.target_file, dirs::home_dir().as_deref())
    }

    pub fn clock(&self) -> Result<NoteClock> {
        NoteClock::from_name(&self.timezone)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatetreeConfig {
    pub base_depth: usize,
}

impl Default for DatetreeConfig {
    fn default() -> Self {
        Self { base_depth: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub period_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_secs: DEFAULT_PERIOD_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SharenoteConfig {
    pub ingest: IngestConfig,
    pub datetree: DatetreeConfig,
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialSharenoteConfig {
    ingest: Option<IngestConfig>,
    datetree: Option<DatetreeConfig>,
    scheduler: Option<SchedulerConfig>,
}

fn env_or_u64(var: &str, fallback: u64) -> u64 {
    match env::var(var) {
        Ok(v) => v.trim().parse::<u64>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_usize(var: &str, fallback: usize) -> usize {
    match env::var(var) {
        Ok(v) => v.trim().parse::<usize>().ok().unwrap_or(fallback),
        Err(_) => fallback,
    }
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn env_or_string(var: &str, fallback: &str) -> String {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => fallback.to_string(),
    }
}

fn validate(cfg: &SharenoteConfig) -> Result<()> {
    if cfg.ingest.note_dir.trim().is_empty() {
        return Err(anyhow!("invalid note dir: cannot be empty"));
    }
    if cfg.ingest.target_file.trim().is_empty() {
        return Err(anyhow!("invalid target file: cannot be empty"));
    }
    let ext = cfg.ingest.note_extension.trim();
    if ext.is_empty() || ext.contains('/') {
        return Err(anyhow!(
            "invalid note extension `{ext}`: use a bare extension such as `txt`"
        ));
    }
    cfg.ingest.clock()?;
    if cfg.datetree.base_depth == 0 || cfg.datetree.base_depth > MAX_BASE_DEPTH {
        return Err(anyhow!(
            "invalid datetree base depth: require 1 <= depth <= {MAX_BASE_DEPTH}"
        ));
    }
    if cfg.scheduler.period_secs == 0 {
        return Err(anyhow!(
            "invalid scheduler period: must be >= 1 second"
        ));
    }
    Ok(())
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("SHARENOTE_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let home = dirs::home_dir()?;
    Some(home.join(".sharenote").join("sharenote.toml"))
}

fn apply_file_config(base: &mut SharenoteConfig, raw: &str, path: &Path) -> Result<()> {
    let parsed: PartialSharenoteConfig = toml::from_str(raw)
        .map_err(|err| anyhow!("failed to parse sharenote config {}: {err}", path.display()))?;
    if let Some(ingest) = parsed.ingest {
        base.ingest = ingest;
    }
    if let Some(datetree) = parsed.datetree {
        base.datetree = datetree;
    }
    if let Some(scheduler) = parsed.scheduler {
        base.scheduler = scheduler;
    }
    Ok(())
}

fn merge_file_config(base: &mut SharenoteConfig) -> Result<()> {
    let Some(path) = resolve_config_path() else {
        return Ok(());
    };
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(&path)?;
    apply_file_config(base, &raw, &path)
}

pub fn load_config() -> Result<SharenoteConfig> {
    let mut cfg = SharenoteConfig::default();
    merge_file_config(&mut cfg)?;

    cfg.ingest.note_dir = env_or_string("SHARENOTE_NOTE_DIR", &cfg.ingest.note_dir);
    cfg.ingest.target_file = env_or_string("SHARENOTE_TARGET_FILE", &cfg.ingest.target_file);
    cfg.ingest.note_extension =
        env_or_string("SHARENOTE_NOTE_EXTENSION", &cfg.ingest.note_extension)
            .trim_start_matches('.')
            .to_string();
    cfg.ingest.timezone = env_or_string("SHARENOTE_TIMEZONE", &cfg.ingest.timezone);
    cfg.datetree.base_depth =
        env_or_usize("SHARENOTE_DATETREE_BASE_DEPTH", cfg.datetree.base_depth);
    cfg.scheduler.enabled = env_or_bool("SHARENOTE_SCHEDULER_ENABLED", cfg.scheduler.enabled);
    cfg.scheduler.period_secs = env_or_u64("SHARENOTE_PERIOD_SECS", cfg.scheduler.period_secs);

    validate(&cfg)?;
    Ok(cfg)
}
