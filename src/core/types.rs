use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Marker file whose presence means the most recent run succeeded.
pub const SENTINEL_FILE: &str = "backup_succeeded";
/// Append-only failure ledger. Never deleted by this crate.
pub const LEDGER_FILE: &str = "backups_failed.log";
/// Name of the log copy placed inside a successful run directory.
pub const PAYLOAD_LOG_FILE: &str = "log.log";

const IN_PROGRESS_SUFFIX: &str = ".in-progress.log";
const FAILED_SUFFIX: &str = ".failed.log";
const RUN_SUFFIX: &str = "backup";
const RUN_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S-%3f%z";

/// Identifier of one backup run.
///
/// Encodes the local start time to the millisecond and its UTC offset,
/// followed by a fixed suffix, e.g. `2026-10-19_08-00-00-123+0200_backup`.
/// The offset keeps the repeated hour of a DST fall-back apart, so two runs
/// started at least one millisecond apart never share an id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Names a run after the current wall-clock time.
    pub fn generate() -> Self {
        Self::at(Local::now())
    }

    /// Names a run after the given instant, in that instant's time zone.
    pub fn at<Tz: TimeZone>(time: DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(format!("{}_{}", time.format(RUN_TIME_FORMAT), RUN_SUFFIX))
    }

    /// Wraps an existing identifier, e.g. one read back from the ledger.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn in_progress_log_name(&self) -> String {
        format!("{}{}", self.0, IN_PROGRESS_SUFFIX)
    }

    pub fn failed_log_name(&self) -> String {
        format!("{}{}", self.0, FAILED_SUFFIX)
    }

    /// Directory under `root` that receives this run's payload.
    pub fn run_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.0)
    }

    pub fn in_progress_log(&self, root: &Path) -> PathBuf {
        root.join(self.in_progress_log_name())
    }

    pub fn failed_log(&self, root: &Path) -> PathBuf {
        root.join(self.failed_log_name())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pass/fail result reported by the backup invoker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    /// Producer exited with status 0.
    Succeeded,
    /// Producer exited with a non-zero status, or was killed by a signal.
    Failed { exit_code: Option<i32> },
    /// Producer could not be started at all.
    LaunchFailed(String),
    /// Producer outlived the configured timeout and was killed.
    TimedOut,
}

impl Verdict {
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Succeeded)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Succeeded => write!(f, "succeeded"),
            Verdict::Failed {
                exit_code: Some(code),
            } => write!(f, "failed (exit code {})", code),
            Verdict::Failed { exit_code: None } => write!(f, "failed (terminated by signal)"),
            Verdict::LaunchFailed(reason) => write!(f, "failed to launch: {}", reason),
            Verdict::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Terminal lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    InProgress,
    Succeeded,
    Failed,
}
