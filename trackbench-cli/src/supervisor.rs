//! Supervisor Process
//!
//! Starts one worker process per parallel slot, then blocks on the join
//! barrier until every worker has terminated. Each worker reports over its
//! own pipe: a `Hello`, then one terminal message. A worker whose pipe closes
//! without a terminal message is reported as crashed.

use crate::start_method::StartMethod;
use crate::worker;
use std::env;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::io::{FromRawFd, RawFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};
use trackbench_core::{Backend, BackendError, BenchmarkConfig};
use trackbench_ipc::{
    FailureKind, FrameAssembler, FrameError, FrameWriter, IPC_FD_ENV, OrchestratorCommand,
    PROTOCOL_VERSION, WORKER_COMMAND_FD, WORKER_FLAG, WORKER_MESSAGE_FD, WorkerMessage,
};

/// Longest single wait inside the join loop
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Time between SIGTERM and SIGKILL for workers that outlive the timeout
const TERM_GRACE: Duration = Duration::from_millis(500);

/// Failures of the fan-out machinery (as opposed to the workload)
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("Failed to start worker: {0}")]
    SpawnFailed(#[from] io::Error),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("{pending} of {total} worker(s) still running after {timeout:?}")]
    WorkerTimeout {
        timeout: Duration,
        pending: usize,
        total: usize,
    },
}

impl From<FrameError> for SupervisorError {
    fn from(e: FrameError) -> Self {
        SupervisorError::IpcError(e.to_string())
    }
}

/// How a single worker ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Ran its whole sequential loop
    Completed,
    /// Reported a failure
    Failed { kind: FailureKind, message: String },
    /// Exited or broke the protocol without reporting an outcome
    Crashed { message: String },
}

/// Collected outcome of one worker
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    /// Position in the fan-out (0-based)
    pub worker_index: u32,
    /// Offset the worker added to its run indices
    pub shard_offset: u32,
    /// OS process id
    pub pid: u32,
    /// Adapter invocations the worker completed
    pub invocations: u32,
    /// Time the worker spent in its loop
    pub elapsed: Duration,
    /// Terminal status
    pub status: WorkerStatus,
}

impl WorkerOutcome {
    /// Whether the worker completed its loop
    pub fn is_completed(&self) -> bool {
        self.status == WorkerStatus::Completed
    }

    fn describe(&self) -> String {
        match &self.status {
            WorkerStatus::Completed => format!("worker {} completed", self.worker_index),
            WorkerStatus::Failed { message, .. } => {
                format!("worker {} failed: {}", self.worker_index, message)
            }
            WorkerStatus::Crashed { message } => {
                format!("worker {} crashed: {}", self.worker_index, message)
            }
        }
    }
}

/// Outcomes of every worker of one fan-out, in worker order
#[derive(Debug, Clone, Default)]
pub struct FanOutReport {
    /// One entry per worker
    pub outcomes: Vec<WorkerOutcome>,
}

impl FanOutReport {
    /// Invocations summed over all workers
    pub fn total_invocations(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|o| u64::from(o.invocations))
            .sum()
    }

    /// Workers that did not complete
    pub fn failures(&self) -> impl Iterator<Item = &WorkerOutcome> {
        self.outcomes.iter().filter(|o| !o.is_completed())
    }

    /// `Err` when any worker failed or crashed
    pub fn into_result(self) -> Result<Self, BackendError> {
        let failed = self.failures().count();
        if failed == 0 {
            return Ok(self);
        }
        let first = self
            .failures()
            .next()
            .map(WorkerOutcome::describe)
            .unwrap_or_default();
        Err(BackendError::Workers {
            failed,
            total: self.outcomes.len(),
            first,
        })
    }
}

/// Create a pipe pair with close-on-exec set, returning (read_fd, write_fd)
fn create_pipe() -> Result<(RawFd, RawFd), io::Error> {
    let mut fds = [0 as RawFd; 2];
    let ret = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    for &fd in &fds {
        unsafe {
            let flags = libc::fcntl(fd, libc::F_GETFD);
            libc::fcntl(fd, libc::F_SETFD, flags | libc::FD_CLOEXEC);
        }
    }
    Ok((fds[0], fds[1]))
}

/// Pipe whose read end returns `WouldBlock` instead of waiting for data
fn create_message_pipe() -> Result<(RawFd, RawFd), io::Error> {
    let (read_fd, write_fd) = create_pipe()?;
    let flags = unsafe { libc::fcntl(read_fd, libc::F_GETFL) };
    if flags < 0 || unsafe { libc::fcntl(read_fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        let e = io::Error::last_os_error();
        close_fd(read_fd);
        close_fd(write_fd);
        return Err(e);
    }
    Ok((read_fd, write_fd))
}

fn close_fd(fd: RawFd) {
    unsafe {
        libc::close(fd);
    }
}

fn waitpid(pid: libc::pid_t, flags: libc::c_int) -> Option<ExitStatus> {
    let mut status: libc::c_int = 0;
    loop {
        let ret = unsafe { libc::waitpid(pid, &mut status, flags) };
        if ret == pid {
            return Some(ExitStatus::from_raw(status));
        }
        if ret == -1 && io::Error::last_os_error().kind() == io::ErrorKind::Interrupted {
            continue;
        }
        return None;
    }
}

enum ProcessKind {
    Spawned(Child),
    Forked(libc::pid_t),
}

/// A worker process that is reaped at most once
struct WorkerProcess {
    kind: ProcessKind,
    exit: Option<ExitStatus>,
}

impl WorkerProcess {
    fn pid(&self) -> u32 {
        match &self.kind {
            ProcessKind::Spawned(child) => child.id(),
            ProcessKind::Forked(pid) => *pid as u32,
        }
    }

    fn try_wait(&mut self) -> Option<ExitStatus> {
        if self.exit.is_none() {
            self.exit = match &mut self.kind {
                ProcessKind::Spawned(child) => child.try_wait().ok().flatten(),
                ProcessKind::Forked(pid) => waitpid(*pid, libc::WNOHANG),
            };
        }
        self.exit
    }

    fn wait(&mut self) -> Option<ExitStatus> {
        if self.exit.is_none() {
            self.exit = match &mut self.kind {
                ProcessKind::Spawned(child) => child.wait().ok(),
                ProcessKind::Forked(pid) => waitpid(*pid, 0),
            };
        }
        self.exit
    }

    fn signal(&mut self, signal: libc::c_int) {
        if self.try_wait().is_none() {
            unsafe {
                libc::kill(self.pid() as libc::pid_t, signal);
            }
        }
    }
}

/// Orchestrator side of one worker
struct WorkerHandle {
    worker_index: u32,
    shard_offset: u32,
    process: WorkerProcess,
    channel: File,
    frames: FrameAssembler,
    msg_read_fd: RawFd,
    greeted: bool,
    closed: bool,
    invocations: u32,
    elapsed: Duration,
    status: Option<WorkerStatus>,
}

impl WorkerHandle {
    fn new(worker_index: u32, shard_offset: u32, kind: ProcessKind, msg_read_fd: RawFd) -> Self {
        Self {
            worker_index,
            shard_offset,
            process: WorkerProcess { kind, exit: None },
            channel: unsafe { File::from_raw_fd(msg_read_fd) },
            frames: FrameAssembler::new(),
            msg_read_fd,
            greeted: false,
            closed: false,
            invocations: 0,
            elapsed: Duration::ZERO,
            status: None,
        }
    }

    /// No further messages are expected
    fn finished(&self) -> bool {
        self.status.is_some() || self.closed
    }

    fn crash(&mut self, message: String) {
        warn!(worker_index = self.worker_index, "{}", message);
        self.status = Some(WorkerStatus::Crashed { message });
    }

    /// Take whatever the pipe holds without blocking and apply every
    /// message that is complete. A partial frame stays buffered until the
    /// rest arrives.
    fn drain(&mut self) {
        let mut chunk = [0u8; 8 * 1024];
        loop {
            match self.channel.read(&mut chunk) {
                Ok(0) => {
                    self.closed = true;
                    break;
                }
                Ok(n) => self.frames.extend(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    self.closed = true;
                    self.crash(format!("worker channel failed: {}", e));
                    return;
                }
            }
        }

        while self.status.is_none() {
            match self.frames.next_frame::<WorkerMessage>() {
                Ok(Some(message)) => self.apply(message),
                Ok(None) => break,
                Err(e) => {
                    self.closed = true;
                    self.crash(format!("unreadable worker message: {}", e));
                    return;
                }
            }
        }

        if self.closed && self.status.is_none() {
            if let Err(e) = self.frames.finish() {
                self.crash(format!("unreadable worker message: {}", e));
            }
        }
    }

    fn apply(&mut self, message: WorkerMessage) {
        match message {
            WorkerMessage::Hello(hello) if !self.greeted => {
                if hello.protocol_version != PROTOCOL_VERSION {
                    self.crash(format!(
                        "worker speaks protocol version {}, expected {}",
                        hello.protocol_version, PROTOCOL_VERSION
                    ));
                    return;
                }
                debug!(worker_index = self.worker_index, pid = hello.pid, "worker ready");
                self.greeted = true;
            }
            WorkerMessage::Hello(_) => self.crash("worker sent a second Hello".to_string()),
            _ if !self.greeted => {
                self.crash("worker reported an outcome before Hello".to_string());
            }
            WorkerMessage::Complete {
                invocations,
                elapsed_nanos,
            } => {
                self.invocations = invocations;
                self.elapsed = Duration::from_nanos(elapsed_nanos);
                self.status = Some(WorkerStatus::Completed);
            }
            WorkerMessage::Failure {
                kind,
                message,
                invocations,
                elapsed_nanos,
            } => {
                warn!(
                    worker_index = self.worker_index,
                    invocations, "worker failed: {}", message
                );
                self.invocations = invocations;
                self.elapsed = Duration::from_nanos(elapsed_nanos);
                self.status = Some(WorkerStatus::Failed { kind, message });
            }
        }
    }

    fn outcome(&self) -> WorkerOutcome {
        let status = match &self.status {
            Some(status) => status.clone(),
            None => WorkerStatus::Crashed {
                message: match self.process.exit {
                    Some(exit) => format!("worker exited ({}) without reporting an outcome", exit),
                    None => "worker closed its channel without reporting an outcome".to_string(),
                },
            },
        };
        if status == WorkerStatus::Completed {
            if let Some(exit) = self.process.exit.filter(|exit| !exit.success()) {
                warn!(
                    worker_index = self.worker_index,
                    "worker completed but exited with {}", exit
                );
            }
        }
        WorkerOutcome {
            worker_index: self.worker_index,
            shard_offset: self.shard_offset,
            pid: self.process.pid(),
            invocations: self.invocations,
            elapsed: self.elapsed,
            status,
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        if self.process.try_wait().is_none() {
            self.process.signal(libc::SIGTERM);
            std::thread::sleep(Duration::from_millis(50));
            self.process.signal(libc::SIGKILL);
            self.process.wait();
        }
    }
}

/// Starts workers for one parallel run and joins them
pub struct Supervisor<'a> {
    backend: &'a dyn Backend,
    method: StartMethod,
    worker_timeout: Option<Duration>,
    binary: Option<PathBuf>,
}

impl<'a> Supervisor<'a> {
    /// Supervisor creating workers with `method`
    pub fn new(backend: &'a dyn Backend, method: StartMethod) -> Self {
        Self {
            backend,
            method,
            worker_timeout: None,
            binary: None,
        }
    }

    /// Bound the join barrier; `None` waits indefinitely
    pub fn with_timeout(mut self, worker_timeout: Option<Duration>) -> Self {
        self.worker_timeout = worker_timeout;
        self
    }

    /// Executable re-invoked for spawned workers (defaults to the current one)
    pub fn with_binary(mut self, binary: Option<PathBuf>) -> Self {
        self.binary = binary;
        self
    }

    /// Run `config` on `num_parallel` workers and wait for all of them.
    ///
    /// Worker `k` runs the whole sequential loop with shard offset
    /// `k * num_parallel`.
    pub fn fan_out(&self, config: &BenchmarkConfig) -> Result<FanOutReport, SupervisorError> {
        let workers = config.num_parallel.max(1);
        debug!(workers, method = %self.method, "starting workers");

        let mut handles = Vec::with_capacity(workers as usize);
        for worker_index in 0..workers {
            let shard_offset = worker_index.saturating_mul(config.num_parallel);
            let handle = match self.method {
                StartMethod::Fork => self.fork_worker(config, worker_index, shard_offset)?,
                StartMethod::Spawn => self.spawn_worker(config, worker_index, shard_offset)?,
            };
            handles.push(handle);
        }

        self.join(&mut handles)?;
        Ok(FanOutReport {
            outcomes: handles.iter().map(WorkerHandle::outcome).collect(),
        })
    }

    fn fork_worker(
        &self,
        config: &BenchmarkConfig,
        worker_index: u32,
        shard_offset: u32,
    ) -> Result<WorkerHandle, SupervisorError> {
        let (msg_read, msg_write) = create_message_pipe()?;

        // Buffered output would otherwise be emitted by parent and child
        let _ = io::stdout().flush();
        let _ = io::stderr().flush();

        match unsafe { libc::fork() } {
            -1 => {
                let e = io::Error::last_os_error();
                close_fd(msg_read);
                close_fd(msg_write);
                Err(SupervisorError::SpawnFailed(e))
            }
            0 => {
                close_fd(msg_read);
                let code =
                    worker::run_forked(self.backend, config, worker_index, shard_offset, msg_write);
                unsafe { libc::_exit(code) }
            }
            pid => {
                close_fd(msg_write);
                Ok(WorkerHandle::new(
                    worker_index,
                    shard_offset,
                    ProcessKind::Forked(pid),
                    msg_read,
                ))
            }
        }
    }

    fn spawn_worker(
        &self,
        config: &BenchmarkConfig,
        worker_index: u32,
        shard_offset: u32,
    ) -> Result<WorkerHandle, SupervisorError> {
        let binary = match &self.binary {
            Some(binary) => binary.clone(),
            None => env::current_exe()?,
        };

        // cmd_pipe: orchestrator writes the command → worker reads fd 3
        let (cmd_read, cmd_write) = create_pipe()?;
        // msg_pipe: worker writes messages to fd 4 → orchestrator reads
        let (msg_read, msg_write) = match create_message_pipe() {
            Ok(fds) => fds,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        let mut command = Command::new(&binary);
        command
            .arg(WORKER_FLAG)
            .env(
                IPC_FD_ENV,
                format!("{},{}", WORKER_COMMAND_FD, WORKER_MESSAGE_FD),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit());
        if tracing::enabled!(tracing::Level::DEBUG) {
            command.arg("--verbose");
        }

        unsafe {
            command.pre_exec(move || {
                // Any of the four pipe fds may already sit on 3 or 4; move the
                // two we keep above the target range before placing them.
                let cmd = libc::fcntl(cmd_read, libc::F_DUPFD_CLOEXEC, 10);
                let msg = libc::fcntl(msg_write, libc::F_DUPFD_CLOEXEC, 10);
                if cmd < 0 || msg < 0 {
                    return Err(io::Error::last_os_error());
                }
                libc::close(cmd_write);
                libc::close(msg_read);
                // dup2 clears close-on-exec on the new descriptor
                if libc::dup2(cmd, WORKER_COMMAND_FD) < 0 || libc::dup2(msg, WORKER_MESSAGE_FD) < 0
                {
                    return Err(io::Error::last_os_error());
                }
                Ok(())
            });
        }

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                close_fd(cmd_read);
                close_fd(cmd_write);
                close_fd(msg_read);
                close_fd(msg_write);
                return Err(SupervisorError::SpawnFailed(e));
            }
        };

        close_fd(cmd_read);
        close_fd(msg_write);

        let handle = WorkerHandle::new(
            worker_index,
            shard_offset,
            ProcessKind::Spawned(child),
            msg_read,
        );

        // Dropping the writer closes fd 3 on our side once the command is out
        let mut writer = FrameWriter::new(unsafe { File::from_raw_fd(cmd_write) });
        writer.write(&OrchestratorCommand::Run {
            config: config.clone(),
            worker_index,
            shard_offset,
        })?;

        Ok(handle)
    }

    /// Block until every worker has reported and exited
    fn join(&self, handles: &mut [WorkerHandle]) -> Result<(), SupervisorError> {
        // A timeout too large to represent as an instant means no deadline
        let deadline = self
            .worker_timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));

        loop {
            let pending: Vec<usize> = (0..handles.len())
                .filter(|&i| !handles[i].finished())
                .collect();
            if pending.is_empty() {
                break;
            }

            let wait = match deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(self.abandon(handles));
                    }
                    remaining.min(POLL_INTERVAL)
                }
                None => POLL_INTERVAL,
            };

            let mut pollfds: Vec<libc::pollfd> = pending
                .iter()
                .map(|&i| libc::pollfd {
                    fd: handles[i].msg_read_fd,
                    events: libc::POLLIN,
                    revents: 0,
                })
                .collect();
            let ready = unsafe {
                libc::poll(
                    pollfds.as_mut_ptr(),
                    pollfds.len() as libc::nfds_t,
                    wait.as_millis() as libc::c_int,
                )
            };
            if ready < 0 {
                let e = io::Error::last_os_error();
                if e.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(SupervisorError::IpcError(format!("poll failed: {}", e)));
            }

            for (pollfd, &i) in pollfds.iter().zip(&pending) {
                if pollfd.revents & libc::POLLNVAL != 0 {
                    handles[i].closed = true;
                } else if pollfd.revents != 0 {
                    handles[i].drain();
                }
            }
        }

        self.reap(handles, deadline)
    }

    /// Wait for every worker process to exit
    fn reap(
        &self,
        handles: &mut [WorkerHandle],
        deadline: Option<Instant>,
    ) -> Result<(), SupervisorError> {
        let Some(deadline) = deadline else {
            for handle in handles.iter_mut() {
                handle.process.wait();
            }
            return Ok(());
        };

        while handles.iter_mut().any(|h| h.process.try_wait().is_none()) {
            if Instant::now() >= deadline {
                return Err(self.abandon(handles));
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok(())
    }

    /// Terminate whatever is still running after the timeout
    fn abandon(&self, handles: &mut [WorkerHandle]) -> SupervisorError {
        let total = handles.len();
        let pending = handles
            .iter_mut()
            .map(|h| !h.finished() || h.process.try_wait().is_none())
            .filter(|running| *running)
            .count();
        let timeout = self.worker_timeout.unwrap_or_default();
        warn!(pending, total, ?timeout, "worker timeout; terminating workers");

        for handle in handles.iter_mut() {
            handle.process.signal(libc::SIGTERM);
        }
        let grace = Instant::now() + TERM_GRACE;
        while Instant::now() < grace && handles.iter_mut().any(|h| h.process.try_wait().is_none())
        {
            std::thread::sleep(Duration::from_millis(10));
        }
        for handle in handles.iter_mut() {
            if handle.process.try_wait().is_none() {
                handle.process.signal(libc::SIGKILL);
                handle.process.wait();
            }
        }

        SupervisorError::WorkerTimeout {
            timeout,
            pending,
            total,
        }
    }
}
