//! Retention pruning of the archive tree.
//!
//! A prune pass runs in four steps:
//! 1. delete every file (recursively, hidden ones included) whose mtime is
//!    older than `now - max_age`, except protected names such as the ledger;
//! 2. drop a short-lived marker file into the root;
//! 3. walk the tree post-order and remove directories left empty, unless they
//!    were created within the grace period;
//! 4. delete the marker.
//!
//! Every deletion is best-effort: a failure is recorded in the report and the
//! sweep carries on.

use crate::core::{BackupError, LEDGER_FILE, Result};
use serde::Serialize;
use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{Level, event, info_span};

/// Directories younger than this are never removed as empty debris, so a
/// run directory being filled by a concurrent backup survives.
///
/// Age is taken from the creation time. Where the filesystem does not record
/// one, the modification time stands in, and deleting a directory's expired
/// files in the same pass refreshes it. Such a directory is then only removed
/// by a pass that runs after the grace period has elapsed.
pub const DIRECTORY_GRACE_PERIOD: Duration = Duration::from_secs(10 * 60);

const MARKER_PREFIX: &str = ".prune-marker-";

#[derive(Debug, Default, Clone, Serialize)]
pub struct PruneReport {
    pub files_deleted: Vec<PathBuf>,
    pub dirs_removed: Vec<PathBuf>,
    /// Empty directories kept because they are inside the grace period.
    pub dirs_in_grace: Vec<PathBuf>,
    pub failures: Vec<String>,
}

impl PruneReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct RetentionPruner {
    max_age: Duration,
    grace_period: Duration,
    protected: Vec<OsString>,
}

impl RetentionPruner {
    pub fn new(max_age: Duration) -> Self {
        Self {
            max_age,
            grace_period: DIRECTORY_GRACE_PERIOD,
            protected: vec![OsString::from(LEDGER_FILE)],
        }
    }

    /// Exempt another file name from age-based deletion.
    pub fn protect(mut self, name: impl Into<OsString>) -> Self {
        self.protected.push(name.into());
        self
    }

    pub fn grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    pub fn prune(&self, root: &Path) -> Result<PruneReport> {
        self.prune_at(root, SystemTime::now())
    }

    /// Runs a prune pass as if the current time were `now`.
    ///
    /// Returns `Err` only if the root itself cannot be listed; everything
    /// below the root is handled best-effort.
    pub fn prune_at(&self, root: &Path, now: SystemTime) -> Result<PruneReport> {
        let span = info_span!("prune", root = %root.display(), max_age_secs = self.max_age.as_secs());
        let _guard = span.enter();

        fs::read_dir(root).map_err(|err| BackupError::io("list archive", root, err))?;

        let mut report = PruneReport::default();
        let file_cutoff = now.checked_sub(self.max_age).unwrap_or(SystemTime::UNIX_EPOCH);
        let dir_cutoff = now.checked_sub(self.grace_period).unwrap_or(SystemTime::UNIX_EPOCH);

        self.delete_expired_files(root, file_cutoff, &mut report);

        let marker = match tempfile::Builder::new().prefix(MARKER_PREFIX).tempfile_in(root) {
            Ok(marker) => Some(marker),
            Err(err) => {
                report.failures.push(format!("create prune marker in '{}': {}", root.display(), err));
                None
            }
        };

        self.sweep_empty_dirs(root, dir_cutoff, &mut report);

        if let Some(marker) = marker {
            if let Err(err) = marker.close() {
                report.failures.push(format!("delete prune marker: {}", err));
            }
        }

        for failure in &report.failures {
            event!(Level::WARN, failure = %failure, "prune step failed");
        }
        event!(
            Level::INFO,
            files = report.files_deleted.len(),
            dirs = report.dirs_removed.len(),
            kept_in_grace = report.dirs_in_grace.len(),
            "prune finished"
        );
        Ok(report)
    }

    fn delete_expired_files(&self, dir: &Path, cutoff: SystemTime, report: &mut PruneReport) {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                report.failures.push(format!("list '{}': {}", dir.display(), err));
                return;
            }
        };

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    report.failures.push(format!("list '{}': {}", dir.display(), err));
                    continue;
                }
            };
            let path = entry.path();
            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(err) => {
                    report.failures.push(format!("stat '{}': {}", path.display(), err));
                    continue;
                }
            };

            if meta.is_dir() {
                self.delete_expired_files(&path, cutoff, report);
                continue;
            }
            if self.protected.iter().any(|name| name.as_os_str() == entry.file_name()) {
                continue;
            }

            let modified = match meta.modified() {
                Ok(modified) => modified,
                Err(err) => {
                    report.failures.push(format!("mtime of '{}': {}", path.display(), err));
                    continue;
                }
            };
            if modified >= cutoff {
                continue;
            }

            match fs::remove_file(&path) {
                Ok(()) => {
                    event!(Level::DEBUG, path = %path.display(), "deleted expired file");
                    report.files_deleted.push(path);
                }
                Err(err) => report.failures.push(format!("delete '{}': {}", path.display(), err)),
            }
        }
    }

    /// Post-order walk over the children of `dir`. Returns whether `dir` has
    /// no entries left once its empty subdirectories were removed. The caller
    /// owns the decision to remove `dir` itself, so the root never is.
    fn sweep_empty_dirs(&self, dir: &Path, cutoff: SystemTime, report: &mut PruneReport) -> bool {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(err) => {
                report.failures.push(format!("list '{}': {}", dir.display(), err));
                return false;
            }
        };

        let mut remaining = 0usize;
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    report.failures.push(format!("list '{}': {}", dir.display(), err));
                    remaining += 1;
                    continue;
                }
            };
            let path = entry.path();
            let meta = match fs::symlink_metadata(&path) {
                Ok(meta) => meta,
                Err(err) => {
                    report.failures.push(format!("stat '{}': {}", path.display(), err));
                    remaining += 1;
                    continue;
                }
            };
            if !meta.is_dir() {
                remaining += 1;
                continue;
            }

            if !self.sweep_empty_dirs(&path, cutoff, report) {
                remaining += 1;
                continue;
            }
            if created_at(&meta) > cutoff {
                report.dirs_in_grace.push(path);
                remaining += 1;
                continue;
            }
            match fs::remove_dir(&path) {
                Ok(()) => {
                    event!(Level::DEBUG, path = %path.display(), "removed empty directory");
                    report.dirs_removed.push(path);
                }
                Err(err) => {
                    report.failures.push(format!("remove '{}': {}", path.display(), err));
                    remaining += 1;
                }
            }
        }
        remaining == 0
    }
}

/// Creation time where the platform records it, modification time otherwise.
fn created_at(meta: &Metadata) -> SystemTime {
    meta.created()
        .or_else(|_| meta.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(3600);

    fn populate(root: &Path) {
        let run = root.join("2026-10-17_08-00-00-000_backup");
        fs::create_dir_all(run.join("pg_wal")).unwrap();
        fs::write(run.join("base.tar.gz"), b"base").unwrap();
        fs::write(run.join("pg_wal").join("000000010000000000000001"), b"wal").unwrap();
        fs::write(run.join(".hidden"), b"dot").unwrap();
        fs::write(root.join("2026-10-17_08-00-00-000_backup.failed.log"), b"boom").unwrap();
        fs::write(root.join(LEDGER_FILE), b"[FAIL] old\n").unwrap();
    }

    #[test]
    fn test_recent_files_are_untouched() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());

        let report = RetentionPruner::new(36 * HOUR).prune(temp_dir.path()).unwrap();

        assert!(report.files_deleted.is_empty());
        assert!(report.dirs_removed.is_empty());
        assert!(temp_dir.path().join("2026-10-17_08-00-00-000_backup/pg_wal").is_dir());
    }

    #[test]
    fn test_expired_tree_is_removed_but_ledger_survives() {
        let temp_dir = TempDir::new().unwrap();
        populate(temp_dir.path());

        let now = SystemTime::now() + 40 * HOUR;
        let report = RetentionPruner::new(36 * HOUR).prune_at(temp_dir.path(), now).unwrap();

        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(report.files_deleted.len(), 4);
        assert_eq!(report.dirs_removed.len(), 2);
        let left: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(left, vec![OsString::from(LEDGER_FILE)]);
    }

    #[test]
    fn test_fresh_empty_directory_is_kept_within_grace_period() {
        let temp_dir = TempDir::new().unwrap();
        let in_flight = temp_dir.path().join("2026-10-19_08-00-00-000_backup");
        fs::create_dir(&in_flight).unwrap();
        fs::write(in_flight.join("partial.tar"), b"...").unwrap();

        let now = SystemTime::now() + Duration::from_secs(5 * 60);
        let report = RetentionPruner::new(Duration::from_secs(60))
            .prune_at(temp_dir.path(), now)
            .unwrap();

        assert_eq!(report.files_deleted.len(), 1);
        assert!(report.dirs_removed.is_empty());
        assert_eq!(report.dirs_in_grace, vec![in_flight.clone()]);
        assert!(in_flight.is_dir());
    }

    #[test]
    fn test_root_is_never_removed_and_marker_is_cleaned_up() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("archive");
        fs::create_dir(&root).unwrap();
        fs::write(root.join("stale.log"), b"x").unwrap();

        let report = RetentionPruner::new(HOUR)
            .prune_at(&root, SystemTime::now() + 2 * HOUR)
            .unwrap();

        assert_eq!(report.files_deleted.len(), 1);
        assert!(root.is_dir());
        assert_eq!(fs::read_dir(&root).unwrap().count(), 0);
    }

    #[test]
    fn test_non_empty_parent_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let parent = temp_dir.path().join("parent");
        fs::create_dir_all(parent.join("empty_child")).unwrap();
        fs::write(parent.join("keep.txt"), b"recent").unwrap();

        let report = RetentionPruner::new(36 * HOUR)
            .grace_period(Duration::ZERO)
            .prune_at(temp_dir.path(), SystemTime::now() + HOUR)
            .unwrap();

        assert_eq!(report.dirs_removed, vec![parent.join("empty_child")]);
        assert!(parent.join("keep.txt").exists());
    }

    #[test]
    fn test_protected_names_apply_at_any_depth() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("nested");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("keep.me"), b"k").unwrap();
        fs::write(nested.join("drop.me"), b"d").unwrap();

        RetentionPruner::new(HOUR)
            .protect("keep.me")
            .prune_at(temp_dir.path(), SystemTime::now() + 2 * HOUR)
            .unwrap();

        assert!(nested.join("keep.me").exists());
        assert!(!nested.join("drop.me").exists());
    }

    #[test]
    fn test_directory_emptied_by_the_pass_goes_once_grace_has_elapsed() {
        let temp_dir = TempDir::new().unwrap();
        let run = temp_dir.path().join("2026-10-17_08-00-00-000+0000_backup");
        fs::create_dir(&run).unwrap();
        fs::write(run.join("base.tar.gz"), b"base").unwrap();

        let now = SystemTime::now() + 2 * HOUR;
        let pruner = RetentionPruner::new(HOUR);
        let first = pruner.prune_at(temp_dir.path(), now).unwrap();
        let second = pruner
            .prune_at(temp_dir.path(), now + DIRECTORY_GRACE_PERIOD + Duration::from_secs(1))
            .unwrap();

        assert_eq!(first.files_deleted, vec![run.join("base.tar.gz")]);
        assert!(first.dirs_in_grace.is_empty());
        assert!(!run.exists());
        assert_eq!(first.dirs_removed.len() + second.dirs_removed.len(), 1);
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = RetentionPruner::new(HOUR).prune(&temp_dir.path().join("absent"));
        assert!(matches!(result, Err(BackupError::Io(_))));
    }
}
