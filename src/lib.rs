// ============================================================================
// basekeeper Library
// ============================================================================

//! Scheduled PostgreSQL base backups with an on-disk lifecycle.
//!
//! Each run gets a timestamped id, streams `pg_basebackup` output into
//! `<archive>/<id>/`, and ends in exactly one of two recorded states:
//!
//! | outcome   | artifacts under the archive root                          |
//! |-----------|-----------------------------------------------------------|
//! | succeeded | `<id>/log.log`, `backup_succeeded`                        |
//! | failed    | `<id>.failed.log`, `[FAIL] <id>` in `backups_failed.log`  |
//!
//! `backup_succeeded` is removed at the start of every run, so its presence
//! always describes the latest run. `backups_failed.log` is never deleted.
//! Expired files and the empty directories they leave behind are pruned
//! before each run.
//!
//! # Examples
//!
//! ```no_run
//! use basekeeper::{BackupConfig, BackupOrchestrator};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = BackupConfig::new("/var/backups/postgresql").retention(36);
//! let report = BackupOrchestrator::from_config(&config).run().await?;
//! println!("{} -> {}", report.run_id, report.verdict);
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod core;
pub mod escalation;
pub mod orchestrator;
pub mod producer;
pub mod status;

// Re-export main types for convenience
pub use archive::{
    ArchiveStore, FsArchiveStore, MemoryArchiveStore, OutcomeRecorder, PruneReport,
    RetentionPruner,
};
pub use config::BackupConfig;
pub use crate::core::{BackupError, Result, RunId, RunState, Verdict};
pub use escalation::{EventSink, FailureEscalator, LoggerCommandSink, MemoryEventSink};
pub use orchestrator::{BackupOrchestrator, RunReport};
pub use producer::{BackupInvoker, BackupProducer, ExternalProducer};
pub use status::{ArchiveStatus, inspect};
