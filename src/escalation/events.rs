//! External event sink used to raise failed backups with the host's
//! monitoring.

use crate::core::{BackupError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};
use tokio::process::Command;

/// Event id used for failed backups.
pub const BACKUP_FAILED_EVENT_ID: u32 = 1;
/// Category used for failed backups.
pub const BACKUP_EVENT_CATEGORY: u16 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Information,
    Warning,
    Error,
}

impl Severity {
    /// syslog facility.priority understood by `logger -p`.
    pub fn syslog_priority(&self) -> &'static str {
        match self {
            Severity::Information => "user.info",
            Severity::Warning => "user.warning",
            Severity::Error => "user.err",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub source: String,
    pub severity: Severity,
    pub category: u16,
    pub event_id: u32,
    pub message: String,
}

#[async_trait]
pub trait EventSink: Send + Sync {
    /// Registers `source` unless it already is. Must be idempotent.
    async fn ensure_source(&self, source: &str) -> Result<()>;

    async fn emit(&self, event: &EventRecord) -> Result<()>;
}

/// Delivers events to syslog through a `logger`-compatible command.
///
/// syslog has no source registry, so registering only validates the tag.
/// Whether the command can run is found out on `emit`.
pub struct LoggerCommandSink {
    command: PathBuf,
    registered: Mutex<BTreeSet<String>>,
}

impl LoggerCommandSink {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            registered: Mutex::new(BTreeSet::new()),
        }
    }

    fn registered(&self) -> MutexGuard<'_, BTreeSet<String>> {
        self.registered.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl EventSink for LoggerCommandSink {
    async fn ensure_source(&self, source: &str) -> Result<()> {
        if self.registered().contains(source) {
            return Ok(());
        }
        if source.trim().is_empty() || source.chars().any(char::is_whitespace) {
            return Err(BackupError::EventSink(format!("invalid event source '{}'", source)));
        }
        self.registered().insert(source.to_string());
        Ok(())
    }

    async fn emit(&self, event: &EventRecord) -> Result<()> {
        let message = format!(
            "[event {} category {}] {}",
            event.event_id, event.category, event.message
        );
        let status = Command::new(&self.command)
            .args(["-t", event.source.as_str(), "-p", event.severity.syslog_priority(), "--"])
            .arg(message)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|err| BackupError::EventSink(err.to_string()))?;

        if status.success() {
            Ok(())
        } else {
            Err(BackupError::EventSink(format!(
                "'{}' exited with {}",
                self.command.display(),
                status
            )))
        }
    }
}

/// Records events in memory.
#[derive(Default)]
pub struct MemoryEventSink {
    sources: Mutex<BTreeSet<String>>,
    events: Mutex<Vec<EventRecord>>,
    refuse_registration: bool,
    refuse_emission: bool,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects source registration, like an unprivileged
    /// account on a host that requires privileges to add a source.
    pub fn refusing_registration() -> Self {
        Self {
            refuse_registration: true,
            ..Self::default()
        }
    }

    pub fn refusing_emission() -> Self {
        Self {
            refuse_emission: true,
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<EventRecord> {
        self.events.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn sources(&self) -> Vec<String> {
        self.sources
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventSink for MemoryEventSink {
    async fn ensure_source(&self, source: &str) -> Result<()> {
        if self.refuse_registration {
            return Err(BackupError::EventSink(format!(
                "permission denied registering '{}'",
                source
            )));
        }
        self.sources
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(source.to_string());
        Ok(())
    }

    async fn emit(&self, event: &EventRecord) -> Result<()> {
        if self.refuse_emission {
            return Err(BackupError::EventSink("event log unavailable".to_string()));
        }
        self.events
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(event.clone());
        Ok(())
    }
}
