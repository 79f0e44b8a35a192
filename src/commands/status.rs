use anyhow::Result;
use std::collections::BTreeSet;
use std::env;

use crate::commands::CommandReport;
use crate::sharenote::config::{load_config, resolve_config_path};
use crate::sharenote::daemon_lock::{daemon_lock_path, read_payload};
use crate::sharenote::paths::resolve_paths;
use crate::sharenote::runner::target_lock_path;
use crate::sharenote::state;
use crate::sharenote::util::pid_alive;
use crate::sharenote::watcher::build_runner;

include!(concat!(env!("OUT_DIR"), "/sharenote_env_allowlist.rs"));

fn unknown_env_keys(set: impl Iterator<Item = String>) -> Vec<String> {
    let known = GENERATED_SHARENOTE_ENV_ALLOWLIST
        .iter()
        .copied()
        .collect::<BTreeSet<_>>();
    set.filter(|key| key.starts_with("SHARENOTE_") && !known.contains(key.as_str()))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn run() -> Result<CommandReport> {
    let paths = resolve_paths()?;
    let cfg = load_config()?;
    let mut report = CommandReport::new("status");

    report.detail(format!("version={}", env!("CARGO_PKG_VERSION")));
    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!("state_dir={}", paths.state_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    if let Some(path) = resolve_config_path() {
        report.detail(format!(
            "config_file={} exists={}",
            path.display(),
            path.exists()
        ));
    }

    let note_dir = cfg.ingest.note_dir_path();
    let target_file = cfg.ingest.target_file_path();
    report.detail(format!("note_dir={}", note_dir.display()));
    report.detail(format!("target_file={}", target_file.display()));
    report.detail(format!("note_extension={}", cfg.ingest.note_extension));
    report.detail(format!("timezone={}", cfg.ingest.clock()?.label()));
    report.detail(format!("datetree.base_depth={}", cfg.datetree.base_depth));
    report.detail(format!("scheduler.enabled={}", cfg.scheduler.enabled));
    report.detail(format!("scheduler.period_secs={}", cfg.scheduler.period_secs));

    if note_dir.is_dir() {
        match build_runner(&paths, &cfg)?.pending_notes() {
            Ok(notes) => report.detail(format!("pending_notes={}", notes.len())),
            Err(err) => report.issue(format!("note dir unreadable: {err}")),
        }
    } else {
        report.issue(format!("missing note dir ({})", note_dir.display()));
    }
    if target_file.exists() {
        if let Ok(lock) = target_lock_path(&target_file) {
            report.detail(format!("target_lock={}", lock.display()));
        }
    } else {
        report.issue(format!(
            "missing target document ({}); passes are skipped until it exists",
            target_file.display()
        ));
    }

    let lock_path = daemon_lock_path(&paths);
    if lock_path.exists() {
        match read_payload(&lock_path) {
            Ok(payload) => {
                report.detail("daemon.lock=found".to_string());
                report.detail(format!("daemon.pid={}", payload.pid));
                report.detail(format!("daemon.start_time={}", payload.start_time));
                if pid_alive(payload.pid) {
                    report.detail("daemon.process=alive".to_string());
                } else {
                    report.issue("daemon.process=dead (stale lock)".to_string());
                }
                let current_uuid = env!("BUILD_UUID");
                if payload.build_uuid == current_uuid {
                    report.detail("daemon.build_match=ok".to_string());
                } else {
                    report.detail(format!(
                        "daemon.build_mismatch=found (lock={} current={})",
                        payload.build_uuid, current_uuid
                    ));
                }
            }
            Err(err) => report.issue(format!("daemon.lock=corrupt ({err:#})")),
        }
    } else {
        report.detail("daemon.lock=not_found (daemon likely not running)".to_string());
    }

    let last = state::load(&paths)?;
    match last.last_pass_epoch_secs {
        Some(at) => {
            report.detail(format!("last_pass_epoch_secs={at}"));
            report.detail(format!("last_processed={}", last.last_processed));
            report.detail(format!("last_skipped={}", last.last_skipped));
        }
        None => report.detail("last_pass=never".to_string()),
    }
    report.detail(format!("total_processed={}", last.total_processed));
    if let Some(err) = last.last_error {
        report.issue(format!("last pass failed: {err}"));
    }

    for key in unknown_env_keys(env::vars().map(|(k, _)| k)) {
        report.issue(format!("unrecognized environment variable {key}"));
    }

    Ok(report)
}
