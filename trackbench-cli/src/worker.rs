//! Worker Process Entry Points
//!
//! Both start methods converge on the same conversation: send `Hello`, run
//! the sequential loop, send exactly one terminal message, exit. A forked
//! child already holds its configuration and backend in the copied image; a
//! spawned worker reads an `OrchestratorCommand::Run` from fd 3 and rebuilds
//! the backend by name.

use anyhow::Context;
use std::fs::File;
use std::os::unix::io::{FromRawFd, RawFd};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Instant;
use tracing::{debug, warn};
use trackbench_backends::backend_by_name;
use trackbench_core::{Backend, BenchmarkConfig, LoadOutcome, run_sequential};
use trackbench_ipc::{
    FailureKind, FrameReader, FrameWriter, IPC_FD_ENV, OrchestratorCommand, WorkerHello,
    WorkerMessage,
};

/// Run one worker's share of the load and describe how it ended
pub(crate) fn run_assignment(
    backend: &dyn Backend,
    config: &BenchmarkConfig,
    worker_index: u32,
    shard_offset: u32,
) -> WorkerMessage {
    debug!(worker_index, shard_offset, "worker loop starting");
    let start = Instant::now();
    let outcome = catch_unwind(AssertUnwindSafe(|| {
        run_sequential(backend, config, shard_offset)
    }));
    let elapsed_nanos = u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX);

    match outcome {
        Ok(LoadOutcome {
            invocations,
            result: Ok(()),
        }) => WorkerMessage::Complete {
            invocations,
            elapsed_nanos,
        },
        Ok(LoadOutcome {
            invocations,
            result: Err(e),
        }) => WorkerMessage::Failure {
            kind: FailureKind::Backend,
            message: e.to_string(),
            invocations,
            elapsed_nanos,
        },
        Err(payload) => WorkerMessage::Failure {
            kind: FailureKind::Panic,
            message: panic_message(payload.as_ref()),
            invocations: 0,
            elapsed_nanos,
        },
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with a non-string payload".to_string()
    }
}

/// Exit status a worker reports alongside its terminal message
pub(crate) fn exit_code(message: &WorkerMessage) -> i32 {
    match message {
        WorkerMessage::Complete { .. } => 0,
        _ => 1,
    }
}

/// Body of a forked child. Returns the status to pass to `_exit`.
pub(crate) fn run_forked(
    backend: &dyn Backend,
    config: &BenchmarkConfig,
    worker_index: u32,
    shard_offset: u32,
    message_fd: RawFd,
) -> i32 {
    let file = unsafe { File::from_raw_fd(message_fd) };
    let mut writer = FrameWriter::new(file);
    if writer
        .write(&WorkerMessage::Hello(WorkerHello::current()))
        .is_err()
    {
        return 2;
    }

    let message = run_assignment(backend, config, worker_index, shard_offset);
    let code = exit_code(&message);
    match writer.write(&message) {
        Ok(()) => code,
        Err(_) => 2,
    }
}

fn detect_fds() -> anyhow::Result<(RawFd, RawFd)> {
    let value = std::env::var(IPC_FD_ENV)
        .with_context(|| format!("{} is not set; workers are started by trackbench", IPC_FD_ENV))?;
    let parts: Vec<&str> = value.split(',').collect();
    if let [read, write] = parts.as_slice() {
        if let (Ok(r), Ok(w)) = (read.trim().parse(), write.trim().parse()) {
            return Ok((r, w));
        }
    }
    anyhow::bail!(
        "invalid {}={:?} (expected format: <read_fd>,<write_fd>)",
        IPC_FD_ENV,
        value
    )
}

/// Entry point of a spawned worker (`--trackbench-worker`)
pub fn run_worker_mode() -> anyhow::Result<()> {
    let (read_fd, write_fd) = detect_fds()?;
    let mut reader = FrameReader::new(unsafe { File::from_raw_fd(read_fd) });
    let mut writer = FrameWriter::new(unsafe { File::from_raw_fd(write_fd) });

    writer.write(&WorkerMessage::Hello(WorkerHello::current()))?;

    let OrchestratorCommand::Run {
        config,
        worker_index,
        shard_offset,
    } = reader.read::<OrchestratorCommand>()?;

    let message = match backend_by_name(&config.backend) {
        Ok(backend) => run_assignment(backend.as_ref(), &config, worker_index, shard_offset),
        Err(e) => WorkerMessage::Failure {
            kind: FailureKind::Config,
            message: e.to_string(),
            invocations: 0,
            elapsed_nanos: 0,
        },
    };
    writer.write(&message)?;

    match message {
        WorkerMessage::Failure { message, .. } => {
            warn!(worker_index, "worker failed: {}", message);
            anyhow::bail!("worker {} failed: {}", worker_index, message)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trackbench_core::{BackendError, HistoryRecord, RunIndex, Session};

    struct Flaky {
        fail_on_run: Option<u32>,
        panic_on_run: Option<u32>,
    }

    struct Quiet;

    impl Session for Quiet {
        fn log_record(&mut self, _record: &HistoryRecord) -> Result<(), BackendError> {
            Ok(())
        }

        fn end(self: Box<Self>) -> Result<(), BackendError> {
            Ok(())
        }
    }

    impl Backend for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn client_version(&self) -> String {
            "0".into()
        }

        fn begin_session(
            &self,
            _config: &BenchmarkConfig,
            run: RunIndex,
        ) -> Result<Box<dyn Session>, BackendError> {
            if self.panic_on_run == Some(run.run_index) {
                panic!("adapter bug");
            }
            if self.fail_on_run == Some(run.run_index) {
                return Err(BackendError::Connect {
                    backend: "flaky".into(),
                    message: "connection refused".into(),
                });
            }
            Ok(Box::new(Quiet))
        }
    }

    fn config() -> BenchmarkConfig {
        BenchmarkConfig {
            num_sequential: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_assignment_completes() {
        let backend = Flaky {
            fail_on_run: None,
            panic_on_run: None,
        };
        let message = run_assignment(&backend, &config(), 0, 0);
        assert!(matches!(
            message,
            WorkerMessage::Complete { invocations: 3, .. }
        ));
        assert_eq!(exit_code(&message), 0);
    }

    #[test]
    fn test_assignment_reports_backend_failure() {
        let backend = Flaky {
            fail_on_run: Some(2),
            panic_on_run: None,
        };
        let message = run_assignment(&backend, &config(), 1, 2);
        match &message {
            WorkerMessage::Failure {
                kind,
                message,
                invocations,
                ..
            } => {
                assert_eq!(*kind, FailureKind::Backend);
                assert!(message.contains("connection refused"));
                assert_eq!(*invocations, 2);
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(exit_code(&message), 1);
    }

    #[test]
    fn test_assignment_catches_panics() {
        let backend = Flaky {
            fail_on_run: None,
            panic_on_run: Some(0),
        };
        let message = run_assignment(&backend, &config(), 0, 0);
        assert!(matches!(
            message,
            WorkerMessage::Failure {
                kind: FailureKind::Panic,
                ..
            }
        ));
    }
}
