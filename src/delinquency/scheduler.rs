//! Timer that drives the delinquency scan.
//!
//! A background thread runs one scan per interval. Timed runs and on-demand
//! runs share a [`SingleRun`] guard, so two scans never overlap. A failed run
//! is logged and the loop keeps going.

use hourglass_rs::{SafeTimeProvider, TimeSource};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::context::CallContext;
use crate::engine::BillingEngine;
use crate::errors::{ErrorKind, Result};
use crate::store::Store;

use super::scanner::ScanReport;

/// at-most-one-holder flag
#[derive(Debug, Default)]
pub struct SingleRun {
    running: AtomicBool,
}

impl SingleRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another holder is running
    pub fn try_acquire(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { owner: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// releases the [`SingleRun`] when dropped
pub struct RunGuard<'a> {
    owner: &'a SingleRun,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.owner.running.store(false, Ordering::Release);
    }
}

enum Command {
    RunNow,
    Stop,
}

/// runs one scan under the guard, `Ok(None)` when one is already in flight
fn run_guarded<S: Store>(
    engine: &BillingEngine<S>,
    guard: &SingleRun,
    ctx: &CallContext<'_>,
) -> Result<Option<ScanReport>> {
    let Some(_running) = guard.try_acquire() else {
        log::warn!("delinquency scan skipped, another run is in progress");
        return Ok(None);
    };
    engine.scan_delinquency(ctx).map(Some)
}

fn log_outcome(outcome: &Result<Option<ScanReport>>) {
    match outcome {
        Ok(Some(report)) => log::info!(
            "delinquency scan {} as of {}: {} checked, {} escalated",
            report.run_id,
            report.as_of,
            report.checked,
            report.escalated_count()
        ),
        Ok(None) => {}
        Err(e) if e.kind() == ErrorKind::Configuration => {
            log::error!("delinquency scan not run, fix the settings: {}", e)
        }
        Err(e) => log::error!("delinquency scan failed: {}", e),
    }
}

/// handle to the scan timer thread, stops it when dropped
pub struct DelinquencyScheduler<S: Store + 'static> {
    engine: Arc<BillingEngine<S>>,
    guard: Arc<SingleRun>,
    commands: Sender<Command>,
    worker: Option<JoinHandle<()>>,
}

impl<S: Store + 'static> DelinquencyScheduler<S> {
    /// start the timer; the first timed run happens one `interval` from now
    pub fn start(engine: Arc<BillingEngine<S>>, interval: Duration) -> Self {
        let guard = Arc::new(SingleRun::new());
        let (commands, receiver) = mpsc::channel();

        let worker = {
            let engine = Arc::clone(&engine);
            let guard = Arc::clone(&guard);
            thread::spawn(move || {
                let time = SafeTimeProvider::new(TimeSource::System);
                loop {
                    match receiver.recv_timeout(interval) {
                        Ok(Command::RunNow) | Err(RecvTimeoutError::Timeout) => {
                            let ctx = CallContext::system(&time);
                            log_outcome(&run_guarded(&engine, &guard, &ctx));
                        }
                        Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("delinquency scheduler stopped");
            })
        };

        log::info!("delinquency scheduler started, interval {:?}", interval);

        Self {
            engine,
            guard,
            commands,
            worker: Some(worker),
        }
    }

    /// start with the interval from the engine's configuration
    pub fn from_config(engine: Arc<BillingEngine<S>>) -> Self {
        let interval = engine.config().scan_interval();
        Self::start(engine, interval)
    }

    /// Run a scan on the calling thread right away.
    ///
    /// Returns `Ok(None)` without scanning when a timed run is in progress.
    pub fn run_now(&self, ctx: &CallContext<'_>) -> Result<Option<ScanReport>> {
        let outcome = run_guarded(&self.engine, &self.guard, ctx);
        log_outcome(&outcome);
        outcome
    }

    /// queue a scan on the timer thread without waiting for it
    pub fn trigger(&self) {
        if self.commands.send(Command::RunNow).is_err() {
            log::warn!("delinquency scheduler is not running, trigger dropped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.commands.send(Command::Stop);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("delinquency scheduler thread panicked");
            }
        }
    }
}

impl<S: Store + 'static> Drop for DelinquencyScheduler<S> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
