//! Single-Flight Run Guard
//!
//! Keeps a periodically triggered job from starting while its previous run is
//! still executing.
//!
//! ```text
//! IDLE ──try_start()──► RUNNING ──finish() / permit dropped──► IDLE
//!                        │
//!                        └─ try_start() ─► false (trigger skipped)
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::warn;

/// Run-exclusion flag for one scheduled job.
///
/// Cheap to clone; clones share the same flag. Create one per job and keep it
/// for the life of the process.
#[derive(Debug, Clone)]
pub struct SingleFlightGuard {
    job: Arc<str>,
    running: Arc<AtomicBool>,
}

impl SingleFlightGuard {
    pub fn new(job: impl Into<Arc<str>>) -> Self {
        Self {
            job: job.into(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Atomically move IDLE -> RUNNING.
    ///
    /// Returns `false`, and logs, when a run is already in progress. A caller
    /// that gets `true` must call [`finish`](Self::finish) on every exit path;
    /// prefer [`acquire`](Self::acquire), which does that on drop.
    pub fn try_start(&self) -> bool {
        let started = self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if !started {
            warn!(job = %self.job, "Previous run still in progress, skipping trigger");
        }
        started
    }

    /// Unconditionally move back to IDLE
    pub fn finish(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// [`try_start`](Self::try_start) returning a permit that finishes the run
    /// when dropped, including on error or panic unwinding
    pub fn acquire(&self) -> Option<RunPermit> {
        self.try_start().then(|| RunPermit {
            guard: self.clone(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn job(&self) -> &str {
        &self.job
    }
}

/// Proof that the holder owns the current run
#[derive(Debug)]
#[must_use = "dropping the permit ends the run immediately"]
pub struct RunPermit {
    guard: SingleFlightGuard,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.guard.finish();
    }
}
