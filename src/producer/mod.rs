//! The external backup-producing process and the invoker that drives it.

pub mod external;
pub mod invoker;

pub use external::ExternalProducer;
pub use invoker::{BackupInvoker, Invocation};

use async_trait::async_trait;
use std::fs::File;
use std::io;
use std::path::Path;

/// How a producer process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerExit {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
}

impl ProducerExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

impl From<std::process::ExitStatus> for ProducerExit {
    fn from(status: std::process::ExitStatus) -> Self {
        Self {
            code: status.code(),
        }
    }
}

/// Something that streams a database backup into `target`.
///
/// Implementations write stdout and stderr, interleaved, to `output` and
/// block until the work is done. An `Err` means the producer could not be
/// started at all. Dropping the returned future must stop the producer.
#[async_trait]
pub trait BackupProducer: Send + Sync {
    /// Short human-readable description used in logs.
    fn describe(&self) -> String;

    async fn produce(&self, target: &Path, output: File) -> io::Result<ProducerExit>;
}
