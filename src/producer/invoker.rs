use super::BackupProducer;
use crate::core::{BackupError, Result, RunId, Verdict};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{Level, event};

/// Result of one producer invocation.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub run: RunId,
    pub target: PathBuf,
    /// The `<id>.in-progress.log` holding the combined producer output.
    pub log_path: PathBuf,
    pub verdict: Verdict,
    pub elapsed: Duration,
}

/// Launches the producer against a fresh run directory and captures its
/// combined output into the run log.
pub struct BackupInvoker {
    producer: Arc<dyn BackupProducer>,
    timeout: Option<Duration>,
}

impl BackupInvoker {
    pub fn new(producer: Arc<dyn BackupProducer>) -> Self {
        Self {
            producer,
            timeout: None,
        }
    }

    /// Kill the producer and report `Verdict::TimedOut` after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Creates `<root>/<id>.in-progress.log`, then runs the producer with
    /// `<root>/<id>` as its target. Blocks until the producer exits.
    ///
    /// Fails only if the run log itself cannot be created; every producer
    /// problem is reported through the verdict.
    pub async fn invoke(&self, root: &Path, run: &RunId) -> Result<Invocation> {
        let target = run.run_dir(root);
        let log_path = run.in_progress_log(root);
        let log = File::create(&log_path)
            .map_err(|err| BackupError::io("create run log", &log_path, err))?;

        event!(
            Level::INFO,
            run = %run,
            producer = %self.producer.describe(),
            target = %target.display(),
            "starting backup producer"
        );

        let started = Instant::now();
        let produce = self.producer.produce(&target, log);
        let outcome = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, produce).await {
                Ok(outcome) => Some(outcome),
                Err(_) => None,
            },
            None => Some(produce.await),
        };

        let verdict = match outcome {
            Some(Ok(exit)) if exit.success() => Verdict::Succeeded,
            Some(Ok(exit)) => Verdict::Failed {
                exit_code: exit.code,
            },
            Some(Err(err)) => {
                event!(Level::ERROR, run = %run, error = %err, "backup producer did not start");
                Verdict::LaunchFailed(err.to_string())
            }
            None => {
                event!(Level::ERROR, run = %run, "backup producer timed out and was killed");
                Verdict::TimedOut
            }
        };

        let elapsed = started.elapsed();
        event!(Level::INFO, run = %run, verdict = %verdict, elapsed_ms = elapsed.as_millis() as u64, "backup producer finished");

        Ok(Invocation {
            run: run.clone(),
            target,
            log_path,
            verdict,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::producer::ProducerExit;
    use async_trait::async_trait;
    use std::io::{self, Write};
    use tempfile::TempDir;

    struct FixedProducer {
        code: i32,
        output: &'static str,
    }

    #[async_trait]
    impl BackupProducer for FixedProducer {
        fn describe(&self) -> String {
            "fixed".to_string()
        }

        async fn produce(&self, target: &Path, mut output: File) -> io::Result<ProducerExit> {
            std::fs::create_dir_all(target)?;
            output.write_all(self.output.as_bytes())?;
            Ok(ProducerExit {
                code: Some(self.code),
            })
        }
    }

    struct StuckProducer;

    #[async_trait]
    impl BackupProducer for StuckProducer {
        fn describe(&self) -> String {
            "stuck".to_string()
        }

        async fn produce(&self, _target: &Path, _output: File) -> io::Result<ProducerExit> {
            std::future::pending::<()>().await;
            Ok(ProducerExit { code: Some(0) })
        }
    }

    struct UnlaunchableProducer;

    #[async_trait]
    impl BackupProducer for UnlaunchableProducer {
        fn describe(&self) -> String {
            "missing".to_string()
        }

        async fn produce(&self, _target: &Path, _output: File) -> io::Result<ProducerExit> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such executable"))
        }
    }

    #[tokio::test]
    async fn test_success_writes_run_log() {
        let temp_dir = TempDir::new().unwrap();
        let run = RunId::from_raw("run_backup");
        let invoker = BackupInvoker::new(Arc::new(FixedProducer {
            code: 0,
            output: "done\n",
        }));

        let invocation = invoker.invoke(temp_dir.path(), &run).await.unwrap();

        assert_eq!(invocation.verdict, Verdict::Succeeded);
        assert_eq!(invocation.log_path, temp_dir.path().join("run_backup.in-progress.log"));
        assert_eq!(std::fs::read_to_string(&invocation.log_path).unwrap(), "done\n");
        assert!(invocation.target.is_dir());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let temp_dir = TempDir::new().unwrap();
        let invoker = BackupInvoker::new(Arc::new(FixedProducer {
            code: 1,
            output: "error: connection refused\n",
        }));

        let invocation = invoker
            .invoke(temp_dir.path(), &RunId::from_raw("r"))
            .await
            .unwrap();
        assert_eq!(invocation.verdict, Verdict::Failed { exit_code: Some(1) });
    }

    #[tokio::test]
    async fn test_launch_error_leaves_empty_log() {
        let temp_dir = TempDir::new().unwrap();
        let invoker = BackupInvoker::new(Arc::new(UnlaunchableProducer));

        let invocation = invoker
            .invoke(temp_dir.path(), &RunId::from_raw("r"))
            .await
            .unwrap();

        assert!(matches!(invocation.verdict, Verdict::LaunchFailed(_)));
        assert_eq!(std::fs::read(&invocation.log_path).unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_a_distinct_failure() {
        let temp_dir = TempDir::new().unwrap();
        let invoker = BackupInvoker::new(Arc::new(StuckProducer))
            .with_timeout(Some(Duration::from_millis(20)));

        let invocation = invoker
            .invoke(temp_dir.path(), &RunId::from_raw("r"))
            .await
            .unwrap();
        assert_eq!(invocation.verdict, Verdict::TimedOut);
    }
}
