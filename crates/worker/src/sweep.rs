//! Verification sweep
//!
//! Re-checks pending custom domains in batches. Runs never overlap: a tick
//! that fires while the previous sweep is still in flight is skipped.

use hostgate_api::{DomainVerifier, SweepReport};
use hostgate_shared::DirectoryError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("Previous sweep still running")]
    AlreadyRunning,

    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

#[derive(Clone)]
pub struct SweepJob {
    verifier: DomainVerifier,
    batch: usize,
    running: Arc<AtomicBool>,
}

/// Clears the running flag when the sweep finishes or is dropped mid-flight
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SweepJob {
    pub fn new(verifier: DomainVerifier, batch: usize) -> Self {
        Self {
            verifier,
            batch: batch.max(1),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn run(&self) -> Result<SweepReport, SweepError> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Skipping verification sweep, previous run still in progress");
            return Err(SweepError::AlreadyRunning);
        }
        let _guard = RunningGuard(self.running.clone());

        match self.verifier.sweep(self.batch).await {
            Ok(report) => {
                if report.checked > 0 {
                    info!(
                        checked = report.checked,
                        verified = report.verified,
                        failed = report.failed,
                        pending = report.pending,
                        retry_later = report.retry_later,
                        errors = report.errors,
                        "Verification sweep complete"
                    );
                }
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "Verification sweep aborted");
                Err(e.into())
            }
        }
    }
}
