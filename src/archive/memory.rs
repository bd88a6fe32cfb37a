//! In-memory archive store.
//!
//! Models the archive root as a flat map of relative paths to contents so the
//! lifecycle rules can be exercised without touching a disk.

use super::store::{ArchiveStore, LEDGER_BANNER, ledger_line, parse_ledger};
use crate::core::{BackupError, LEDGER_FILE, PAYLOAD_LOG_FILE, Result, RunId, SENTINEL_FILE};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
pub struct MemoryArchiveStore {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryArchiveStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates the invoker writing a run's in-progress log.
    pub fn write_run_log(&self, run: &RunId, output: &[u8]) {
        self.files().insert(run.in_progress_log_name(), output.to_vec());
    }

    pub fn put(&self, name: &str, contents: &[u8]) {
        self.files().insert(name.to_string(), contents.to_vec());
    }

    pub fn read(&self, name: &str) -> Option<Vec<u8>> {
        self.files().get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.files().contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.files().keys().cloned().collect()
    }

    fn files(&self) -> MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ArchiveStore for MemoryArchiveStore {
    fn clear_sentinel(&self) -> Result<bool> {
        Ok(self.files().remove(SENTINEL_FILE).is_some())
    }

    fn mark_succeeded(&self, run: &RunId) -> Result<()> {
        let mut files = self.files();
        let log_name = run.in_progress_log_name();
        let log = files
            .get(&log_name)
            .cloned()
            .ok_or_else(|| BackupError::MissingRunLog(PathBuf::from(&log_name)))?;

        files.insert(format!("{}/{}", run, PAYLOAD_LOG_FILE), log.clone());

        if files.contains_key(SENTINEL_FILE) {
            return Err(BackupError::SentinelConflict(PathBuf::from(SENTINEL_FILE)));
        }
        files.remove(&log_name);
        files.insert(SENTINEL_FILE.to_string(), log);
        Ok(())
    }

    fn mark_failed(&self, run: &RunId) -> Result<()> {
        let mut files = self.files();
        let log_name = run.in_progress_log_name();
        let log = files
            .remove(&log_name)
            .ok_or_else(|| BackupError::MissingRunLog(PathBuf::from(&log_name)))?;
        files.insert(run.failed_log_name(), log);
        Ok(())
    }

    fn append_failure(&self, run: &RunId) -> Result<()> {
        let mut files = self.files();
        let ledger = files.entry(LEDGER_FILE.to_string()).or_insert_with(|| {
            let mut banner = LEDGER_BANNER.as_bytes().to_vec();
            banner.push(b'\n');
            banner
        });
        ledger.extend_from_slice(ledger_line(run).as_bytes());
        Ok(())
    }

    fn sentinel_exists(&self) -> bool {
        self.exists(SENTINEL_FILE)
    }

    fn ledger_entries(&self) -> Result<Vec<RunId>> {
        Ok(self
            .read(LEDGER_FILE)
            .map(|bytes| parse_ledger(&String::from_utf8_lossy(&bytes)))
            .unwrap_or_default())
    }

    fn failed_logs(&self) -> Result<Vec<String>> {
        Ok(self
            .names()
            .into_iter()
            .filter(|name| !name.contains('/') && name.ends_with(".failed.log"))
            .collect())
    }
}
