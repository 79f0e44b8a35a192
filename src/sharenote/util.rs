use anyhow::{Context, Result, bail};
use std::process::Command;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn now_epoch_secs() -> Result<u64> {
    Ok(SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs())
}

fn ps_field(pid: u32, field: &str) -> Option<String> {
    let out = Command::new("ps")
        .args(["-p", pid.to_string().as_str(), "-o", field])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// True while `pid` exists and is not a zombie.
pub fn pid_alive(pid: u32) -> bool {
    if cfg!(windows) {
        // fs2's try_lock_exclusive on the daemon lock is the liveness check there.
        return true;
    }
    let Ok(status) = Command::new("kill").arg("-0").arg(pid.to_string()).status() else {
        return false;
    };
    if !status.success() {
        return false;
    }
    // zombies still answer kill -0
    ps_field(pid, "stat=").is_some_and(|stat| !stat.starts_with('Z'))
}

/// Full command line of `pid`, or `None` once it is gone.
pub fn process_command_line(pid: u32) -> Option<String> {
    ps_field(pid, "command=").filter(|line| !line.is_empty())
}

pub fn send_sigterm(pid: u32) -> Result<()> {
    let status = Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .status()
        .context("failed to send SIGTERM with `kill -TERM`")?;
    if !status.success() && pid_alive(pid) {
        bail!("`kill -TERM {pid}` failed and process is still alive");
    }
    Ok(())
}

/// Polls until `pid` has exited; false when `timeout` runs out first.
pub fn wait_for_exit(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if !pid_alive(pid) {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(EXIT_POLL_INTERVAL);
    }
}

pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}
