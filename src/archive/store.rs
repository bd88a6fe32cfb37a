use crate::core::{Result, RunId};
use std::sync::Arc;

/// Header written once when the failure ledger is created.
pub const LEDGER_BANNER: &str = "\
This file records failed database backups, one [FAIL] line per run.
It is never removed automatically. Its presence alone means at least one
backup failed since it was last deleted by an operator.
";

pub(crate) const FAIL_PREFIX: &str = "[FAIL] ";

/// All mutation of the sentinel and the failure ledger goes through this
/// trait, so the at-most-one-sentinel rule lives in one place.
pub trait ArchiveStore: Send + Sync {
    /// Removes `backup_succeeded` if present. Returns whether one was removed.
    fn clear_sentinel(&self) -> Result<bool>;

    /// Copies the run log into the run directory as `log.log`, then moves the
    /// top-level run log to `backup_succeeded` without overwriting.
    fn mark_succeeded(&self, run: &RunId) -> Result<()>;

    /// Renames the top-level run log to `<id>.failed.log`.
    fn mark_failed(&self, run: &RunId) -> Result<()>;

    /// Appends a `[FAIL] <id>` line to the ledger, creating it with a banner
    /// if needed.
    fn append_failure(&self, run: &RunId) -> Result<()>;

    fn sentinel_exists(&self) -> bool;

    /// Run ids recorded in the failure ledger, oldest first.
    fn ledger_entries(&self) -> Result<Vec<RunId>>;

    /// Names of the `<id>.failed.log` artifacts currently present.
    fn failed_logs(&self) -> Result<Vec<String>>;
}

/// Narrow capability handed to the failure escalator.
pub trait LedgerWriter: Send + Sync {
    fn record_failure(&self, run: &RunId) -> Result<()>;
}

impl<T: ArchiveStore + ?Sized> LedgerWriter for T {
    fn record_failure(&self, run: &RunId) -> Result<()> {
        ArchiveStore::append_failure(self, run)
    }
}

/// Hands a shared store to the escalator as a ledger.
pub struct StoreLedger(pub Arc<dyn ArchiveStore>);

impl LedgerWriter for StoreLedger {
    fn record_failure(&self, run: &RunId) -> Result<()> {
        self.0.append_failure(run)
    }
}

pub(crate) fn parse_ledger(content: &str) -> Vec<RunId> {
    content
        .lines()
        .filter_map(|line| line.strip_prefix(FAIL_PREFIX))
        .map(|id| RunId::from_raw(id.trim()))
        .collect()
}

pub(crate) fn ledger_line(run: &RunId) -> String {
    format!("{}{}\n", FAIL_PREFIX, run)
}
