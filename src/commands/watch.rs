use anyhow::Result;

use crate::commands::CommandReport;
use crate::sharenote::config::load_config;
use crate::sharenote::paths::resolve_paths;
use crate::sharenote::watcher;

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub once: bool,
    pub daemon: bool,
}

pub fn run(opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");

    if opts.once && opts.daemon {
        report.issue("invalid flags: use only one of --once or --daemon");
        return Ok(report);
    }

    let paths = resolve_paths()?;
    let cfg = load_config()?;

    if opts.daemon {
        report.detail(format!(
            "starting sharenote watcher in daemon mode period_secs={}",
            cfg.scheduler.period_secs
        ));
        watcher::run_daemon(&paths, &cfg)?;
        report.detail("sharenote watcher daemon stopped");
        return Ok(report);
    }

    let cycle = watcher::run_once(&paths, &cfg)?;
    let pass = &cycle.pass;
    report.detail("sharenote ingest pass completed");
    report.detail(format!("state_file={}", cycle.state_file));
    report.detail(format!("note_dir={}", cycle.note_dir.display()));
    report.detail(format!("target_file={}", cycle.target_file.display()));
    report.detail(format!("period_secs={}", cycle.period_secs));
    report.detail(format!("target_present={}", pass.target_present));
    report.detail(format!("scanned={}", pass.scanned));
    report.detail(format!("processed={}", pass.processed));
    report.detail(format!("persisted={}", pass.persisted));
    for skipped in &pass.skipped {
        report.detail(format!(
            "skipped={} code={} reason={}",
            skipped.path.display(),
            skipped.code.as_str(),
            skipped.reason
        ));
    }
    for path in &pass.undeleted {
        report.issue(format!(
            "filed note could not be removed and will be filed again next pass: {}",
            path.display()
        ));
    }
    if let Some(line) = pass.status_line() {
        report.detail(line);
    }

    Ok(report)
}
