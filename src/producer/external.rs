//! Producer backed by an external executable, normally `pg_basebackup`.

use super::{BackupProducer, ProducerExit};
use crate::config::BackupConfig;
use async_trait::async_trait;
use std::ffi::OsString;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Placeholder replaced by the target directory in argument templates.
pub const TARGET_PLACEHOLDER: &str = "{target}";

#[derive(Debug, Clone)]
pub struct ExternalProducer {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalProducer {
    /// Runs `program` with `args`; any argument equal to `{target}` is
    /// replaced by the target directory.
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `pg_basebackup` as the configured role, without a password prompt,
    /// with a fast checkpoint, tar output, streamed WAL and server-side
    /// compression. Credentials come from the producer's own `.pgpass`.
    pub fn pg_basebackup(config: &BackupConfig) -> Self {
        Self::new(
            config.producer_path.clone(),
            vec![
                "-U".to_string(),
                config.database_role.clone(),
                "--no-password".to_string(),
                "--checkpoint=fast".to_string(),
                "--format=tar".to_string(),
                "--wal-method=stream".to_string(),
                "--compress=server-gzip".to_string(),
                "-D".to_string(),
                TARGET_PLACEHOLDER.to_string(),
            ],
        )
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn resolve_args(&self, target: &Path) -> Vec<OsString> {
        self.args
            .iter()
            .map(|arg| {
                if arg == TARGET_PLACEHOLDER {
                    target.as_os_str().to_os_string()
                } else {
                    OsString::from(arg)
                }
            })
            .collect()
    }
}

#[async_trait]
impl BackupProducer for ExternalProducer {
    fn describe(&self) -> String {
        self.program.display().to_string()
    }

    async fn produce(&self, target: &Path, output: File) -> io::Result<ProducerExit> {
        let stderr = output.try_clone()?;
        let mut cmd = Command::new(&self.program);
        cmd.args(self.resolve_args(target))
            .stdin(Stdio::null())
            .stdout(Stdio::from(output))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let status = child.wait().await?;
        Ok(ProducerExit::from(status))
    }
}
