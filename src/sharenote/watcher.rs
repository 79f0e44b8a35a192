use crate::sharenote::audit;
use crate::sharenote::config::SharenoteConfig;
use crate::sharenote::daemon_lock;
use crate::sharenote::paths::SharenotePaths;
use crate::sharenote::runner::{IngestionRunner, PassOutcome, RunnerOptions};
use crate::sharenote::scheduler::Scheduler;
use crate::sharenote::state::{load, save};
use crate::sharenote::util::now_epoch_secs;
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::sync::mpsc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct WatchCycleOutcome {
    pub state_file: String,
    pub note_dir: PathBuf,
    pub target_file: PathBuf,
    pub period_secs: u64,
    pub pass: PassOutcome,
}

pub fn build_runner(paths: &SharenotePaths, cfg: &SharenoteConfig) -> Result<IngestionRunner> {
    let opts = RunnerOptions {
        note_extension: cfg.ingest.note_extension.clone(),
        base_depth: cfg.datetree.base_depth,
        clock: cfg.ingest.clock()?,
        lock_target: true,
    };
    Ok(IngestionRunner::new(
        cfg.ingest.note_dir_path(),
        cfg.ingest.target_file_path(),
        opts,
    ))
}

fn audit_pass(paths: &SharenotePaths, pass: &PassOutcome) -> Result<()> {
    if !pass.target_present {
        return audit::append_event(paths, "ingest", "skipped", "reason=target-missing");
    }
    if pass.processed == 0 && pass.is_clean() {
        return Ok(());
    }

    let mut message = format!(
        "scanned={} processed={} skipped={} undeleted={} persisted={}",
        pass.scanned,
        pass.processed,
        pass.skipped.len(),
        pass.undeleted.len(),
        pass.persisted
    );
    for skipped in &pass.skipped {
        message.push_str(&format!(
            " | skip={} code={}",
            skipped.path.display(),
            skipped.code.as_str()
        ));
    }
    for path in &pass.undeleted {
        message.push_str(&format!(" | undeleted={}", path.display()));
    }
    let status = if pass.is_clean() { "ok" } else { "degraded" };
    audit::append_event(paths, "ingest", status, &message)
}

pub fn run_once(paths: &SharenotePaths, cfg: &SharenoteConfig) -> Result<WatchCycleOutcome> {
    let runner = build_runner(paths, cfg)?;
    let mut state = load(paths)?;
    state.last_pass_epoch_secs = Some(now_epoch_secs()?);

    let pass = match runner.run() {
        Ok(pass) => pass,
        Err(err) => {
            let summary = format!("{}: {err}", err.code().as_str());
            state.last_processed = 0;
            state.last_skipped = 0;
            state.last_error = Some(summary.clone());
            save(paths, &state)?;
            audit::append_event(paths, "ingest", "failed", &summary)?;
            return Err(anyhow::Error::new(err).context("ingest pass failed"));
        }
    };

    state.last_processed = pass.processed;
    state.last_skipped = pass.skipped.len();
    state.total_processed = state
        .total_processed
        .saturating_add(u64::try_from(pass.processed).unwrap_or(u64::MAX));
    state.last_error = None;
    let file = save(paths, &state)?;
    audit_pass(paths, &pass)?;

    Ok(WatchCycleOutcome {
        state_file: file.display().to_string(),
        note_dir: runner.note_dir().to_path_buf(),
        target_file: runner.target_file().to_path_buf(),
        period_secs: cfg.scheduler.period_secs,
        pass,
    })
}

pub fn run_daemon(paths: &SharenotePaths, cfg: &SharenoteConfig) -> Result<()> {
    if !cfg.scheduler.enabled {
        bail!("scheduler is disabled; set scheduler.enabled = true or SHARENOTE_SCHEDULER_ENABLED=1");
    }
    let lock = daemon_lock::acquire(paths)?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("failed to install shutdown signal handler")?;

    let job_paths = paths.clone();
    let job_cfg = cfg.clone();
    let mut scheduler = Scheduler::new();
    scheduler.start(Duration::from_secs(cfg.scheduler.period_secs), move || {
        if let Err(err) = run_once(&job_paths, &job_cfg) {
            error!("ingest cycle failed: {err:#}");
        }
    })?;
    info!(lock = %lock.path().display(), "sharenote daemon running");

    let _ = shutdown_rx.recv();
    info!("shutdown requested; letting any in-flight pass finish");
    scheduler.stop();
    drop(lock);
    Ok(())
}
