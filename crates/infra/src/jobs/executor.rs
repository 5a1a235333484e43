//! Shell executor: runs one job's command and turns the result into a completion.
//!
//! The executor never touches the store. Every way a run can end, including
//! the shell failing to start, becomes a [`JobCompletion`] for that job only.

use std::io;
use std::process::Stdio;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use jobrunner_core::{Job, JobCompletion, JobOutcome, JobOutput};

/// Shell used when none is configured.
pub const DEFAULT_SHELL: &str = "bash";

/// How long to keep reading buffered output after a timed out command is killed.
const KILL_DRAIN_GRACE: Duration = Duration::from_millis(250);

/// Raw result of one command run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Exited with code 0
    pub success: bool,
    /// Exit code, `None` when terminated by a signal
    pub exit_code: Option<i32>,
    /// Interleaved stdout and stderr, in arrival order
    pub output: Vec<u8>,
    /// Killed because the timeout elapsed
    pub timed_out: bool,
}

/// Runs commands as `<shell> -c <command>`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
    timeout: Option<Duration>,
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL)
    }
}

impl ShellExecutor {
    pub fn new(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
            timeout: None,
        }
    }

    /// Kill commands that run longer than `timeout`. `None` or zero disables it.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout.filter(|t| !t.is_zero());
        self
    }

    pub fn shell(&self) -> &str {
        &self.shell
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Run `job` and describe how it ended.
    pub async fn run(&self, job: &Job, worker: &str) -> JobCompletion {
        info!(job_id = %job.id, worker, "job started");

        let (outcome, output) = match self.execute(&job.command).await {
            Ok(result) => {
                let outcome = JobOutcome::from_success(result.success);
                info!(
                    job_id = %job.id,
                    worker,
                    exit_code = ?result.exit_code,
                    timed_out = result.timed_out,
                    output_bytes = result.output.len(),
                    status = %jobrunner_core::JobStatus::from(outcome),
                    "job finished"
                );
                (outcome, JobOutput::encode(&result.output))
            }
            Err(e) => {
                warn!(job_id = %job.id, worker, shell = %self.shell, error = %e, "job could not be launched");
                let message = format!("failed to run {} -c: {}", self.shell, e);
                (JobOutcome::Failed, JobOutput::encode(message))
            }
        };

        JobCompletion::new(job.id, outcome, worker, output)
    }

    /// Spawn the command and collect its combined output.
    ///
    /// Errors only when the shell can not be spawned or waited on; a non-zero
    /// exit is a normal result.
    pub async fn execute(&self, command: &str) -> io::Result<ExecutionResult> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        // A timeout kills this whole group.
        #[cfg(unix)]
        cmd.process_group(0);
        let mut child = cmd.spawn()?;

        let (chunk_tx, mut chunk_rx) = mpsc::unbounded_channel::<Bytes>();
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(pump(stdout, chunk_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(pump(stderr, chunk_tx.clone()));
        }
        drop(chunk_tx);

        let deadline = self.timeout.map(|t| Instant::now() + t);
        let mut output = Vec::new();
        let mut timed_out = false;

        // Read until both pipes close or the deadline passes.
        loop {
            let next = match deadline {
                Some(deadline) => tokio::select! {
                    chunk = chunk_rx.recv() => chunk,
                    _ = tokio::time::sleep_until(deadline) => {
                        timed_out = true;
                        break;
                    }
                },
                None => chunk_rx.recv().await,
            };
            match next {
                Some(chunk) => output.extend_from_slice(&chunk),
                None => break,
            }
        }

        // Pipes can close before the process exits.
        if !timed_out {
            if let Some(deadline) = deadline {
                if let Ok(status) = tokio::time::timeout_at(deadline, child.wait()).await {
                    return Ok(finished(status?, output));
                }
                timed_out = true;
            }
        }

        if timed_out {
            debug!(command, "killing timed out command");
            let exit_code = match kill_process_group(&mut child) {
                Ok(()) => match child.wait().await {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(error = %e, "failed to reap timed out command");
                        None
                    }
                },
                Err(e) => {
                    warn!(error = %e, "failed to kill timed out command");
                    None
                }
            };

            // The group is dead, so the pipes close once the buffered bytes are read.
            let drain_deadline = Instant::now() + KILL_DRAIN_GRACE;
            while let Ok(Some(chunk)) = tokio::time::timeout_at(drain_deadline, chunk_rx.recv()).await {
                output.extend_from_slice(&chunk);
            }

            let secs = self.timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
            output.extend_from_slice(format!("\n[jobrunner] command timed out after {secs}s\n").as_bytes());
            return Ok(ExecutionResult {
                success: false,
                exit_code,
                output,
                timed_out: true,
            });
        }

        let status = child.wait().await?;
        Ok(finished(status, output))
    }
}

fn finished(status: std::process::ExitStatus, output: Vec<u8>) -> ExecutionResult {
    ExecutionResult {
        success: status.success(),
        exit_code: status.code(),
        output,
        timed_out: false,
    }
}

/// SIGKILL the child's process group.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) -> io::Result<()> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return Ok(());
    };
    // SAFETY: killpg only sends a signal; the group id is the child's pid
    // because it was spawned with process_group(0).
    let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) -> io::Result<()> {
    child.start_kill()
}

/// Forward everything read from `reader` as chunks until EOF or a read error.
async fn pump<R>(mut reader: R, tx: mpsc::UnboundedSender<Bytes>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(4096);
    loop {
        buf.reserve(4096);
        match reader.read_buf(&mut buf).await {
            Ok(n) if n > 0 => {
                if tx.send(buf.split().freeze()).is_err() {
                    break;
                }
            }
            _ => break,
        }
    }
}
