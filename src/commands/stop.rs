use anyhow::Result;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use crate::commands::CommandReport;
use crate::sharenote::daemon_lock::{daemon_lock_path, read_payload};
use crate::sharenote::paths::resolve_paths;
use crate::sharenote::util::{pid_alive, process_command_line, send_sigterm, wait_for_exit};

const STOP_TIMEOUT: Duration = Duration::from_secs(8);

fn is_sharenote_daemon(command_line: &str) -> bool {
    command_line.contains("sharenote") && command_line.contains("watch --daemon")
}

fn remove_lock(lock_path: &Path, report: &mut CommandReport) {
    match fs::remove_file(lock_path) {
        Ok(()) => report.detail(format!("removed stale daemon lock {}", lock_path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => report.detail(format!(
            "failed to remove daemon lock {}: {err}",
            lock_path.display()
        )),
    }
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("stop");
    let lock_path = daemon_lock_path(&resolve_paths()?);
    report.detail(format!("daemon_lock={}", lock_path.display()));

    if !lock_path.exists() {
        report.detail("sharenote daemon already stopped (lock file not found)");
        return Ok(report);
    }
    let pid = match read_payload(&lock_path) {
        Ok(payload) => payload.pid,
        Err(err) => {
            report.issue(format!("cannot identify daemon: {err:#}"));
            return Ok(report);
        }
    };
    report.detail(format!("daemon_pid={pid}"));

    if !pid_alive(pid) {
        report.detail(format!("daemon pid {pid} is not running"));
        remove_lock(&lock_path, &mut report);
        return Ok(report);
    }
    match process_command_line(pid) {
        Some(line) if is_sharenote_daemon(&line) => {}
        other => {
            report.issue(format!(
                "refusing to signal pid {pid}; not a sharenote daemon: {}",
                other.as_deref().unwrap_or("<unknown>")
            ));
            return Ok(report);
        }
    }

    send_sigterm(pid)?;
    if wait_for_exit(pid, STOP_TIMEOUT) {
        report.detail(format!("stopped sharenote daemon pid={pid}"));
        remove_lock(&lock_path, &mut report);
    } else {
        report.issue(format!(
            "daemon pid {pid} still running {}s after SIGTERM",
            STOP_TIMEOUT.as_secs()
        ));
    }
    Ok(report)
}
