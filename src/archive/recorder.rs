use super::store::ArchiveStore;
use crate::core::{Result, RunId, RunState, Verdict};
use std::sync::Arc;
use tracing::{Level, event};

/// Drives a run through `InProgress -> Succeeded | Failed`.
pub struct OutcomeRecorder {
    store: Arc<dyn ArchiveStore>,
}

impl OutcomeRecorder {
    pub fn new(store: Arc<dyn ArchiveStore>) -> Self {
        Self { store }
    }

    /// Entry step of every run: forget the previous run's success so the
    /// sentinel only ever describes the latest run.
    pub fn begin(&self) -> Result<RunState> {
        if self.store.clear_sentinel()? {
            event!(Level::DEBUG, "cleared previous success sentinel");
        }
        Ok(RunState::InProgress)
    }

    /// Applies the terminal transition for `run`. The run log must still be
    /// in its in-progress location.
    pub fn record(&self, run: &RunId, verdict: &Verdict) -> Result<RunState> {
        if verdict.is_success() {
            self.store.mark_succeeded(run)?;
            event!(Level::INFO, run = %run, "backup recorded as succeeded");
            Ok(RunState::Succeeded)
        } else {
            self.store.mark_failed(run)?;
            event!(Level::WARN, run = %run, verdict = %verdict, "backup recorded as failed");
            Ok(RunState::Failed)
        }
    }
}
