//! Filesystem-backed archive store.

use super::store::{ArchiveStore, LEDGER_BANNER, ledger_line, parse_ledger};
use crate::core::{BackupError, LEDGER_FILE, PAYLOAD_LOG_FILE, Result, RunId, SENTINEL_FILE};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub struct FsArchiveStore {
    root: PathBuf,
}

impl FsArchiveStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sentinel_path(&self) -> PathBuf {
        self.root.join(SENTINEL_FILE)
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILE)
    }

    /// Run directories currently present, sorted by name (oldest first).
    pub fn run_dirs(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|err| BackupError::io("list archive", &self.root, err))?;
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| BackupError::io("list archive", &self.root, err))?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if is_dir {
                dirs.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    /// Moves `from` to `to`, failing if `to` already exists.
    ///
    /// A hard link cannot replace an existing path, so the link is the
    /// atomic no-clobber step; the source is unlinked afterwards.
    fn move_no_clobber(&self, from: &Path, to: &Path) -> Result<()> {
        match fs::hard_link(from, to) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(BackupError::SentinelConflict(to.to_path_buf()));
            }
            Err(err) => return Err(BackupError::io("link", to, err)),
        }
        fs::remove_file(from).map_err(|err| BackupError::io("remove", from, err))
    }

    fn require_run_log(&self, run: &RunId) -> Result<PathBuf> {
        let log = run.in_progress_log(&self.root);
        if !log.is_file() {
            return Err(BackupError::MissingRunLog(log));
        }
        Ok(log)
    }
}

impl ArchiveStore for FsArchiveStore {
    fn clear_sentinel(&self) -> Result<bool> {
        let sentinel = self.sentinel_path();
        match fs::remove_file(&sentinel) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(BackupError::io("remove sentinel", &sentinel, err)),
        }
    }

    fn mark_succeeded(&self, run: &RunId) -> Result<()> {
        let log = self.require_run_log(run)?;
        let run_dir = run.run_dir(&self.root);
        fs::create_dir_all(&run_dir).map_err(|err| BackupError::io("create", &run_dir, err))?;

        let payload_log = run_dir.join(PAYLOAD_LOG_FILE);
        fs::copy(&log, &payload_log).map_err(|err| BackupError::io("copy log to", &payload_log, err))?;

        self.move_no_clobber(&log, &self.sentinel_path())
    }

    fn mark_failed(&self, run: &RunId) -> Result<()> {
        let log = self.require_run_log(run)?;
        let failed = run.failed_log(&self.root);
        fs::rename(&log, &failed).map_err(|err| BackupError::io("rename log to", &failed, err))
    }

    fn append_failure(&self, run: &RunId) -> Result<()> {
        let ledger = self.ledger_path();
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&ledger) {
            Ok(mut file) => {
                file.write_all(LEDGER_BANNER.as_bytes())
                    .and_then(|_| file.write_all(b"\n"))
                    .map_err(|err| BackupError::io("write ledger banner", &ledger, err))?;
                file
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => OpenOptions::new()
                .append(true)
                .open(&ledger)
                .map_err(|err| BackupError::io("open ledger", &ledger, err))?,
            Err(err) => return Err(BackupError::io("create ledger", &ledger, err)),
        };

        file.write_all(ledger_line(run).as_bytes())
            .map_err(|err| BackupError::io("append ledger", &ledger, err))?;
        file.sync_data()
            .map_err(|err| BackupError::io("sync ledger", &ledger, err))?;
        Ok(())
    }

    fn sentinel_exists(&self) -> bool {
        self.sentinel_path().is_file()
    }

    fn ledger_entries(&self) -> Result<Vec<RunId>> {
        let ledger = self.ledger_path();
        match fs::read_to_string(&ledger) {
            Ok(content) => Ok(parse_ledger(&content)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(BackupError::io("read ledger", &ledger, err)),
        }
    }

    fn failed_logs(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.root)
            .map_err(|err| BackupError::io("list archive", &self.root, err))?;
        let mut logs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| BackupError::io("list archive", &self.root, err))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".failed.log") {
                logs.push(name);
            }
        }
        logs.sort();
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn start_run(root: &Path, run: &RunId, output: &str) {
        fs::create_dir_all(run.run_dir(root)).unwrap();
        fs::write(run.run_dir(root).join("base.tar.gz"), b"payload").unwrap();
        fs::write(run.in_progress_log(root), output).unwrap();
    }

    #[test]
    fn test_mark_succeeded_moves_log_into_payload_and_sentinel() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsArchiveStore::new(temp_dir.path());
        let run = RunId::from_raw("2026-10-19_08-00-00-000_backup");
        start_run(temp_dir.path(), &run, "pg_basebackup: base backup completed\n");

        store.mark_succeeded(&run).unwrap();

        assert!(store.sentinel_exists());
        assert!(!run.in_progress_log(temp_dir.path()).exists());
        assert!(!run.failed_log(temp_dir.path()).exists());
        let copied = fs::read_to_string(run.run_dir(temp_dir.path()).join(PAYLOAD_LOG_FILE)).unwrap();
        assert_eq!(copied, "pg_basebackup: base backup completed\n");
        assert_eq!(fs::read_to_string(store.sentinel_path()).unwrap(), copied);
    }

    #[test]
    fn test_mark_succeeded_refuses_to_overwrite_sentinel() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsArchiveStore::new(temp_dir.path());
        fs::write(store.sentinel_path(), "from an overlapping run").unwrap();
        let run = RunId::from_raw("2026-10-19_08-00-00-001_backup");
        start_run(temp_dir.path(), &run, "ok\n");

        let err = store.mark_succeeded(&run).unwrap_err();
        assert!(matches!(err, BackupError::SentinelConflict(_)));
        assert_eq!(
            fs::read_to_string(store.sentinel_path()).unwrap(),
            "from an overlapping run"
        );
        assert!(run.in_progress_log(temp_dir.path()).exists());
    }

    #[test]
    fn test_mark_failed_renames_log() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsArchiveStore::new(temp_dir.path());
        let run = RunId::from_raw("2026-10-19_08-00-00-002_backup");
        start_run(temp_dir.path(), &run, "pg_basebackup: error: connection refused\n");

        store.mark_failed(&run).unwrap();

        assert!(!store.sentinel_exists());
        assert!(!run.in_progress_log(temp_dir.path()).exists());
        assert_eq!(
            store.failed_logs().unwrap(),
            vec!["2026-10-19_08-00-00-002_backup.failed.log".to_string()]
        );
    }

    #[test]
    fn test_transition_without_run_log_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsArchiveStore::new(temp_dir.path());
        let run = RunId::from_raw("never-started");
        assert!(matches!(store.mark_failed(&run), Err(BackupError::MissingRunLog(_))));
        assert!(matches!(store.mark_succeeded(&run), Err(BackupError::MissingRunLog(_))));
    }

    #[test]
    fn test_clear_sentinel_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsArchiveStore::new(temp_dir.path());
        assert!(!store.clear_sentinel().unwrap());
        fs::write(store.sentinel_path(), "").unwrap();
        assert!(store.clear_sentinel().unwrap());
        assert!(!store.sentinel_exists());
        assert!(!store.clear_sentinel().unwrap());
    }

    #[test]
    fn test_ledger_banner_written_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsArchiveStore::new(temp_dir.path());
        let first = RunId::from_raw("run-1");
        let second = RunId::from_raw("run-2");

        store.append_failure(&first).unwrap();
        store.append_failure(&second).unwrap();

        let content = fs::read_to_string(store.ledger_path()).unwrap();
        assert!(content.starts_with(LEDGER_BANNER));
        assert_eq!(content.matches("never removed automatically").count(), 1);
        assert!(content.ends_with("[FAIL] run-1\n[FAIL] run-2\n"));
        assert_eq!(store.ledger_entries().unwrap(), vec![first, second]);
    }

    #[test]
    fn test_run_dirs_lists_only_directories() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsArchiveStore::new(temp_dir.path());
        fs::create_dir(temp_dir.path().join("b_backup")).unwrap();
        fs::create_dir(temp_dir.path().join("a_backup")).unwrap();
        fs::write(temp_dir.path().join("x.failed.log"), "").unwrap();
        assert_eq!(store.run_dirs().unwrap(), vec!["a_backup", "b_backup"]);
    }
}
