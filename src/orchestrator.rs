//! One backup run end to end.
//!
//! ```text
//! ensure_writable ──► prune (optional) ──► clear sentinel ──► name run
//!        │                                                        │
//!      fatal                                                      ▼
//!                             escalate ◄── Failed ◄── record ◄── invoke
//!                                          Succeeded ──┘
//! ```
//!
//! Only a non-writable archive root is returned as an error. Every other
//! problem is recorded on disk and in the returned [`RunReport`].

use crate::archive::{
    ArchiveStore, FsArchiveStore, OutcomeRecorder, PruneReport, RetentionPruner, StoreLedger,
    ensure_writable,
};
use crate::config::BackupConfig;
use crate::core::{Result, RunId, RunState, Verdict};
use crate::escalation::{EscalationReport, EventSink, FailureEscalator, LoggerCommandSink};
use crate::producer::{BackupInvoker, BackupProducer, ExternalProducer};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{Instrument, Level, event, info_span};

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub verdict: Verdict,
    /// `InProgress` when the terminal transition itself could not be applied.
    pub state: RunState,
    pub prune: Option<PruneReport>,
    pub escalation: Option<EscalationReport>,
    /// The previous run's `backup_succeeded` could not be removed. Whatever
    /// the verdict, the sentinel on disk then describes an older run and must
    /// not be read as this run's success.
    pub stale_sentinel: bool,
    pub diagnostics: Vec<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded && !self.stale_sentinel
    }
}

pub struct BackupOrchestrator {
    root: PathBuf,
    store: Arc<dyn ArchiveStore>,
    pruner: Option<RetentionPruner>,
    invoker: BackupInvoker,
    recorder: OutcomeRecorder,
    escalator: FailureEscalator,
}

impl BackupOrchestrator {
    /// Wires `pg_basebackup` and the syslog event sink from `config`.
    pub fn from_config(config: &BackupConfig) -> Self {
        Self::new(
            config,
            Arc::new(ExternalProducer::pg_basebackup(config)),
            Arc::new(LoggerCommandSink::new(config.event_command.clone())),
        )
    }

    pub fn new(
        config: &BackupConfig,
        producer: Arc<dyn BackupProducer>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let root = config.archive_root.clone();
        let store: Arc<dyn ArchiveStore> = Arc::new(FsArchiveStore::new(&root));

        let pruner = config
            .retention_enabled
            .then(|| RetentionPruner::new(config.retention_window()));

        let mut escalator = FailureEscalator::new(config.event_source.clone(), invoker_identity());
        if config.failure_log_enabled {
            escalator = escalator.with_ledger(Arc::new(StoreLedger(store.clone())));
        }
        if config.failure_event_enabled {
            escalator = escalator.with_events(events);
        }

        Self {
            invoker: BackupInvoker::new(producer).with_timeout(config.producer_timeout()),
            recorder: OutcomeRecorder::new(store.clone()),
            root,
            store,
            pruner,
            escalator,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &Arc<dyn ArchiveStore> {
        &self.store
    }

    /// Writability check followed by a retention pass, without a backup.
    pub fn prune_only(&self) -> Result<Option<PruneReport>> {
        ensure_writable(&self.root)?;
        Ok(self.prune())
    }

    pub async fn run(&self) -> Result<RunReport> {
        let span = info_span!("backup_run", root = %self.root.display());
        self.run_once().instrument(span).await
    }

    async fn run_once(&self) -> Result<RunReport> {
        if let Err(err) = ensure_writable(&self.root) {
            event!(Level::ERROR, error = %err, "archive root is not writable, aborting");
            return Err(err);
        }

        let mut diagnostics = Vec::new();
        let prune = self.prune();
        if let Some(report) = &prune {
            diagnostics.extend(report.failures.iter().map(|f| format!("prune: {}", f)));
        }

        let stale_sentinel = match self.recorder.begin() {
            Ok(_) => false,
            Err(err) => {
                event!(Level::ERROR, error = %err, "could not clear previous sentinel");
                diagnostics.push(format!("clear sentinel: {}", err));
                true
            }
        };

        let run_id = RunId::generate();
        let verdict = match self.invoker.invoke(&self.root, &run_id).await {
            Ok(invocation) => invocation.verdict,
            Err(err) => {
                event!(Level::ERROR, run = %run_id, error = %err, "could not start run");
                diagnostics.push(format!("invoke: {}", err));
                Verdict::LaunchFailed(err.to_string())
            }
        };

        let state = match self.recorder.record(&run_id, &verdict) {
            Ok(state) => state,
            Err(err) => {
                event!(Level::ERROR, run = %run_id, error = %err, "could not record run outcome");
                diagnostics.push(format!("record: {}", err));
                RunState::InProgress
            }
        };

        let escalation = if verdict.is_success() {
            None
        } else {
            let report = self
                .escalator
                .escalate(&run_id, &run_id.run_dir(&self.root))
                .await;
            diagnostics.extend(
                report
                    .diagnostics
                    .iter()
                    .map(|d| format!("escalation {:?}: {}", d.channel, d.error)),
            );
            Some(report)
        };

        Ok(RunReport {
            run_id,
            verdict,
            state,
            prune,
            escalation,
            stale_sentinel,
            diagnostics,
        })
    }

    fn prune(&self) -> Option<PruneReport> {
        let pruner = self.pruner.as_ref()?;
        match pruner.prune(&self.root) {
            Ok(report) => Some(report),
            Err(err) => {
                event!(Level::WARN, error = %err, "retention pass failed, continuing");
                Some(PruneReport {
                    failures: vec![err.to_string()],
                    ..PruneReport::default()
                })
            }
        }
    }
}

/// Identifies this program in failure events.
fn invoker_identity() -> String {
    std::env::current_exe()
        .map(|path| path.display().to_string())
        .unwrap_or_else(|_| env!("CARGO_PKG_NAME").to_string())
}
