use crate::core::{BackupError, Result};
use std::fs;
use std::path::Path;
use tracing::{Level, event};

/// Creates `root` if missing and proves it is writable by creating and
/// deleting a probe file. Any failure is fatal for the orchestration.
pub fn ensure_writable(root: &Path) -> Result<()> {
    let not_writable = |reason: String| BackupError::NotWritable {
        path: root.to_path_buf(),
        identity: current_identity(),
        reason,
    };

    fs::create_dir_all(root).map_err(|err| not_writable(format!("create directory: {}", err)))?;

    let probe = tempfile::Builder::new()
        .prefix(".write-probe-")
        .tempfile_in(root)
        .map_err(|err| not_writable(format!("create probe file: {}", err)))?;
    probe
        .close()
        .map_err(|err| not_writable(format!("delete probe file: {}", err)))?;

    event!(Level::DEBUG, root = %root.display(), "archive root is writable");
    Ok(())
}

/// Identity the process writes as: the effective uid, with its passwd
/// name when one resolves, e.g. `postgres (uid 26)`.
#[cfg(unix)]
pub fn current_identity() -> String {
    use nix::unistd::{User, geteuid};

    let uid = geteuid();
    match User::from_uid(uid) {
        Ok(Some(user)) => format!("{} (uid {})", user.name, uid),
        _ => format!("uid {}", uid),
    }
}

#[cfg(not(unix))]
pub fn current_identity() -> String {
    std::env::var("USERNAME")
        .ok()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
