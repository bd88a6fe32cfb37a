//! Read-only view of an archive root for operators and monitoring.

use crate::archive::{ArchiveStore, FsArchiveStore};
use crate::core::{BackupError, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize)]
pub struct ArchiveStatus {
    pub root: PathBuf,
    /// Whether `backup_succeeded` is present, i.e. the latest run succeeded.
    pub last_run_succeeded: bool,
    pub last_success_at: Option<DateTime<Local>>,
    pub run_dirs: Vec<String>,
    pub failed_logs: Vec<String>,
    /// Runs whose log is still `<id>.in-progress.log`.
    pub in_progress: Vec<String>,
    pub ledger_failures: usize,
}

pub fn inspect(root: &Path) -> Result<ArchiveStatus> {
    let store = FsArchiveStore::new(root);
    let last_success_at = match fs::metadata(store.sentinel_path()) {
        Ok(meta) => meta.modified().ok().map(DateTime::<Local>::from),
        Err(_) => None,
    };

    let mut in_progress = Vec::new();
    let entries = fs::read_dir(root).map_err(|err| BackupError::io("list archive", root, err))?;
    for entry in entries {
        let entry = entry.map_err(|err| BackupError::io("list archive", root, err))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(run) = name.strip_suffix(".in-progress.log") {
            in_progress.push(run.to_string());
        }
    }
    in_progress.sort();

    Ok(ArchiveStatus {
        root: root.to_path_buf(),
        last_run_succeeded: store.sentinel_exists(),
        last_success_at,
        run_dirs: store.run_dirs()?,
        failed_logs: store.failed_logs()?,
        in_progress,
        ledger_failures: store.ledger_entries()?.len(),
    })
}
