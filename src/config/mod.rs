//! Static configuration read once at process start.
//!
//! Values come from the built-in defaults, then an optional JSON file, then
//! `BASEKEEPER_*` environment variables.

use crate::core::{BackupError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "BASEKEEPER_CONFIG";

/// Backup orchestration configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory holding every run and lifecycle artifact
    pub archive_root: PathBuf,

    /// Prune expired artifacts before each run
    pub retention_enabled: bool,

    /// Files older than this many hours are pruned
    pub retention_hours: u64,

    /// Append to `backups_failed.log` on failure
    pub failure_log_enabled: bool,

    /// Emit an event to the external event sink on failure
    pub failure_event_enabled: bool,

    /// Location of the `pg_basebackup` executable
    pub producer_path: PathBuf,

    /// Database role the producer connects as
    pub database_role: String,

    /// Source name registered with the event sink
    pub event_source: String,

    /// Command used to deliver events (syslog `logger` compatible)
    pub event_command: PathBuf,

    /// Kill the producer after this many seconds. `None` waits forever.
    pub timeout_secs: Option<u64>,

    /// Interval between runs in `watch` mode
    pub schedule_hours: u64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            archive_root: PathBuf::from("/var/backups/postgresql"),
            retention_enabled: true,
            retention_hours: 36,
            failure_log_enabled: true,
            failure_event_enabled: true,
            producer_path: PathBuf::from("pg_basebackup"),
            database_role: "postgres".to_string(),
            event_source: "basekeeper".to_string(),
            event_command: PathBuf::from("logger"),
            timeout_secs: None,
            schedule_hours: 8, // pg_basebackup every 8 hours
        }
    }
}

impl BackupConfig {
    pub fn new(archive_root: impl Into<PathBuf>) -> Self {
        Self {
            archive_root: archive_root.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|err| BackupError::io("read config", path, err))?;
        serde_json::from_str(&raw).map_err(|err| {
            BackupError::Config(format!("parse '{}': {}", path.display(), err))
        })
    }

    /// Resolves the effective configuration: defaults, then `path` (or
    /// `BASEKEEPER_CONFIG`), then environment overrides. Validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let from_env = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        let mut config = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `BASEKEEPER_*` overrides obtained through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("BASEKEEPER_ARCHIVE_ROOT") {
            self.archive_root = PathBuf::from(value);
        }
        if let Some(value) = lookup("BASEKEEPER_RETENTION_ENABLED") {
            self.retention_enabled = parse_flag("BASEKEEPER_RETENTION_ENABLED", &value)?;
        }
        if let Some(value) = lookup("BASEKEEPER_RETENTION_HOURS") {
            self.retention_hours = parse_number("BASEKEEPER_RETENTION_HOURS", &value)?;
        }
        if let Some(value) = lookup("BASEKEEPER_FAILURE_LOG_ENABLED") {
            self.failure_log_enabled = parse_flag("BASEKEEPER_FAILURE_LOG_ENABLED", &value)?;
        }
        if let Some(value) = lookup("BASEKEEPER_FAILURE_EVENT_ENABLED") {
            self.failure_event_enabled = parse_flag("BASEKEEPER_FAILURE_EVENT_ENABLED", &value)?;
        }
        if let Some(value) = lookup("BASEKEEPER_PRODUCER_PATH") {
            self.producer_path = PathBuf::from(value);
        }
        if let Some(value) = lookup("BASEKEEPER_DATABASE_ROLE") {
            self.database_role = value;
        }
        if let Some(value) = lookup("BASEKEEPER_TIMEOUT_SECS") {
            self.timeout_secs = if value.trim().is_empty() {
                None
            } else {
                Some(parse_number("BASEKEEPER_TIMEOUT_SECS", &value)?)
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.archive_root.as_os_str().is_empty() {
            return Err(BackupError::Config("archive_root must not be empty".to_string()));
        }
        if self.retention_enabled && self.retention_hours == 0 {
            return Err(BackupError::Config(
                "retention_hours must be > 0 when retention is enabled".to_string(),
            ));
        }
        if self.producer_path.as_os_str().is_empty() {
            return Err(BackupError::Config("producer_path must not be empty".to_string()));
        }
        if self.database_role.trim().is_empty() {
            return Err(BackupError::Config("database_role must not be empty".to_string()));
        }
        if self.schedule_hours == 0 {
            return Err(BackupError::Config("schedule_hours must be > 0".to_string()));
        }
        if self.timeout_secs == Some(0) {
            return Err(BackupError::Config(
                "timeout_secs must be > 0 (omit it to wait forever)".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the archive root
    pub fn archive_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.archive_root = root.into();
        self
    }

    /// Enable retention with the given window
    pub fn retention(mut self, hours: u64) -> Self {
        self.retention_enabled = true;
        self.retention_hours = hours;
        self
    }

    /// Disable retention pruning
    pub fn without_retention(mut self) -> Self {
        self.retention_enabled = false;
        self
    }

    /// Toggle the failure ledger
    pub fn failure_log(mut self, enabled: bool) -> Self {
        self.failure_log_enabled = enabled;
        self
    }

    /// Toggle failure events
    pub fn failure_event(mut self, enabled: bool) -> Self {
        self.failure_event_enabled = enabled;
        self
    }

    /// Set the producer executable
    pub fn producer_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.producer_path = path.into();
        self
    }

    /// Set producer timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn retention_window(&self) -> Duration {
        Duration::from_secs(self.retention_hours.saturating_mul(3600))
    }

    pub fn producer_timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.schedule_hours.saturating_mul(3600))
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(BackupError::Config(format!(
            "{} must be a boolean, got '{}'",
            key, other
        ))),
    }
}

fn parse_number(key: &str, value: &str) -> Result<u64> {
    value.trim().parse::<u64>().map_err(|_| {
        BackupError::Config(format!("{} must be a non-negative integer, got '{}'", key, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = BackupConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.retention_window(), Duration::from_secs(36 * 3600));
        assert_eq!(config.schedule_interval(), Duration::from_secs(8 * 3600));
        assert_eq!(config.producer_timeout(), None);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("BASEKEEPER_ARCHIVE_ROOT", "/mnt/backups"),
            ("BASEKEEPER_RETENTION_ENABLED", "no"),
            ("BASEKEEPER_RETENTION_HOURS", "72"),
            ("BASEKEEPER_FAILURE_EVENT_ENABLED", "0"),
            ("BASEKEEPER_TIMEOUT_SECS", "3600"),
        ]
        .into_iter()
        .collect();

        let mut config = BackupConfig::default();
        config
            .apply_env(|key| vars.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.archive_root, PathBuf::from("/mnt/backups"));
        assert!(!config.retention_enabled);
        assert_eq!(config.retention_hours, 72);
        assert!(config.failure_log_enabled);
        assert!(!config.failure_event_enabled);
        assert_eq!(config.timeout_secs, Some(3600));
    }

    #[test]
    fn test_invalid_env_flag_is_rejected() {
        let mut config = BackupConfig::default();
        let result = config.apply_env(|key| {
            (key == "BASEKEEPER_RETENTION_ENABLED").then(|| "maybe".to_string())
        });
        assert!(matches!(result, Err(BackupError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_retention() {
        let config = BackupConfig::default().retention(0);
        assert!(matches!(config.validate(), Err(BackupError::Config(_))));
        let config = BackupConfig::default().retention(0).without_retention();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_fills_missing_fields_with_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("basekeeper.json");
        std::fs::write(&path, r#"{ "archive_root": "/srv/pg", "retention_hours": 48 }"#).unwrap();

        let config = BackupConfig::from_file(&path).unwrap();
        assert_eq!(config.archive_root, PathBuf::from("/srv/pg"));
        assert_eq!(config.retention_hours, 48);
        assert_eq!(config.database_role, "postgres");
        assert!(config.failure_log_enabled);
    }

    #[test]
    fn test_from_file_rejects_garbage() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.json");
        std::fs::write(&path, "retention_hours = 3").unwrap();
        assert!(matches!(BackupConfig::from_file(&path), Err(BackupError::Config(_))));
    }
}
