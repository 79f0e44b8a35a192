//! Fixed-period pass scheduling.
//!
//! Ticks sit on a grid measured from `start` (0, p, 2p, ...). A tick that
//! comes due while a pass is still running is skipped rather than queued,
//! and `stop` only takes effect between passes.

use anyhow::{Result, bail};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Allows at most one holder at a time; contenders are turned away instead of waiting.
#[derive(Debug, Clone, Default)]
pub struct SingleFlight {
    busy: Arc<AtomicBool>,
}

struct BusyReset<'a>(&'a AtomicBool);

impl Drop for BusyReset<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl SingleFlight {
    pub fn try_run<R>(&self, job: impl FnOnce() -> R) -> Option<R> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }
        let _reset = BusyReset(&self.busy);
        Some(job())
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

/// Offset from start of the first grid tick strictly after `elapsed`.
pub fn next_tick_after(elapsed: Duration, period: Duration) -> Duration {
    let period_nanos = period.as_nanos().max(1);
    let ticks = elapsed.as_nanos() / period_nanos + 1;
    let nanos = ticks.saturating_mul(period_nanos);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

struct Running {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

#[derive(Default)]
pub struct Scheduler {
    guard: SingleFlight,
    running: Option<Running>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }

    pub fn start<F>(&mut self, period: Duration, mut job: F) -> Result<()>
    where
        F: FnMut() + Send + 'static,
    {
        if self.running.is_some() {
            bail!("scheduler already started");
        }
        if period.is_zero() {
            bail!("scheduler period must be greater than zero");
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let guard = self.guard.clone();
        let thread = thread::Builder::new()
            .name("sharenote-scheduler".to_string())
            .spawn(move || {
                let started = Instant::now();
                loop {
                    if guard.try_run(&mut job).is_none() {
                        debug!("pass already in flight; tick skipped");
                    }
                    let elapsed = started.elapsed();
                    let wait = next_tick_after(elapsed, period).saturating_sub(elapsed);
                    match stop_rx.recv_timeout(wait) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        info!(period_secs = period.as_secs(), "scheduler started");
        self.running = Some(Running { stop_tx, thread });
        Ok(())
    }

    /// Runs `job` immediately unless a scheduled pass is in flight.
    pub fn run_now<R>(&self, job: impl FnOnce() -> R) -> Option<R> {
        self.guard.try_run(job)
    }

    /// Prevents further ticks, then waits for an in-flight pass to finish.
    pub fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        let _ = running.stop_tx.send(());
        if running.thread.join().is_err() {
            warn!("scheduler thread panicked");
        }
        info!("scheduler stopped");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
