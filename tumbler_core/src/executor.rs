use crate::input::Input;
use crate::platform::Platform;
use log::{debug, warn};
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// How often a running child is polled for exit.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);
/// Upper bound on waiting for the stdin feeder and the output drain once
/// the target's process group is gone. Only a process that left the group
/// can hold the pipes open past this.
const PIPE_CLOSE_GRACE: Duration = Duration::from_millis(500);
const OUTPUT_CHUNK_SIZE: usize = 8 * 1024;
/// Unix shells report death-by-signal N as exit status 128 + N.
const SIGNAL_EXIT_BASE: i64 = 128;

/// How a trial ended, as seen from the harness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// The child terminated on its own with this normalised exit status.
    Exited(i64),
    /// The child exceeded the wall-clock budget and was killed.
    Timeout,
}

/// Everything observed about one execution of the target.
#[derive(Debug, Clone)]
pub struct TrialResult {
    /// How the target ended.
    pub status: ExecutionStatus,
    /// Standard output and standard error, interleaved as the child wrote them.
    pub output: Vec<u8>,
    /// False when the child closed its standard input before reading all of it.
    pub input_delivered: bool,
    /// Wall-clock time from spawn until output was collected.
    pub elapsed: Duration,
}

impl TrialResult {
    /// The normalised exit status, or `None` if the trial timed out.
    pub fn exit_status(&self) -> Option<i64> {
        match self.status {
            ExecutionStatus::Exited(code) => Some(code),
            ExecutionStatus::Timeout => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Failed to spawn command '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },
    #[error("Failed to set up output pipe: {0}")]
    Pipe(#[source] io::Error),
    #[error("Error waiting for child: {0}")]
    Wait(#[source] io::Error),
    #[error("Failed to kill timed-out process: {0}")]
    Kill(#[source] io::Error),
}

/// An `Executor` runs the target once per call.
///
/// Implementations keep no per-trial state between calls: every process,
/// pipe and buffer a trial creates is released before `execute_sync` returns.
pub trait Executor<I: Input> {
    /// Runs the target against one input and waits for it to finish.
    ///
    /// # Arguments
    /// * `input`: The bytes delivered to the target's standard input.
    ///
    /// # Returns
    /// `Result<TrialResult, ExecutionError>`:
    ///   - `Ok(result)`: The target ran; `result` holds its status and output,
    ///     including timeouts.
    ///   - `Err(error)`: The target could not be run or waited on at all.
    fn execute_sync(&mut self, input: &I) -> Result<TrialResult, ExecutionError>;
}

pub struct CommandExecutorConfig {
    /// Full command line, handed to the platform shell as one string.
    pub command: String,
    pub working_dir: PathBuf,
    pub timeout: Duration,
    pub platform: Platform,
}

/// Executes the target through the platform shell, feeding the input on
/// standard input.
///
/// On Unix the shell leads a fresh process group, so everything it starts
/// (pipelines, wrapper scripts, background helpers) is killed together.
pub struct CommandExecutor {
    config: CommandExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: CommandExecutorConfig) -> Self {
        Self { config }
    }

    fn wait_with_timeout(&self, child: &mut Child) -> Result<ExecutionStatus, ExecutionError> {
        let start_time = Instant::now();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(ExecutionStatus::Exited(normalise_exit(status))),
                Ok(None) => {
                    if start_time.elapsed() > self.config.timeout {
                        warn!(
                            "Target exceeded {:?}, killing process group {}",
                            self.config.timeout,
                            child.id()
                        );
                        kill_process_group(child).map_err(ExecutionError::Kill)?;
                        child.wait().map_err(ExecutionError::Wait)?;
                        return Ok(ExecutionStatus::Timeout);
                    }
                    thread::sleep(WAIT_POLL_INTERVAL);
                }
                Err(e) => {
                    // Reap before bailing so no zombie outlives the trial.
                    let _ = kill_process_group(child);
                    let _ = child.wait();
                    return Err(ExecutionError::Wait(e));
                }
            }
        }
    }
}

impl<I: Input> Executor<I> for CommandExecutor {
    fn execute_sync(&mut self, input: &I) -> Result<TrialResult, ExecutionError> {
        let start_time = Instant::now();
        let (program, args) = self.config.platform.shell_invocation(&self.config.command);

        let (output_reader, output_writer) = os_pipe::pipe().map_err(ExecutionError::Pipe)?;
        let error_writer = output_writer.try_clone().map_err(ExecutionError::Pipe)?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .current_dir(&self.config.working_dir)
            .stdin(Stdio::piped())
            .stdout(output_writer)
            .stderr(error_writer);
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }
        let spawned = cmd.spawn();
        // The parent's copies of the write end live in `cmd`; the reader only
        // sees EOF once they are closed.
        drop(cmd);
        let mut child = spawned.map_err(|source| ExecutionError::Spawn {
            command: self.config.command.clone(),
            source,
        })?;

        let (fed_tx, fed_rx) = mpsc::channel();
        match child.stdin.take() {
            Some(stdin) => {
                let data = input.as_bytes().to_vec();
                thread::spawn(move || {
                    let _ = fed_tx.send(deliver_input(stdin, &data));
                });
            }
            None => {
                let _ = fed_tx.send(false);
            }
        }

        let captured = Arc::new(Mutex::new(Vec::new()));
        let (drained_tx, drained_rx) = mpsc::channel();
        let sink = Arc::clone(&captured);
        thread::spawn(move || {
            drain_output(output_reader, &sink);
            let _ = drained_tx.send(());
        });

        let status = self.wait_with_timeout(&mut child)?;
        // The shell is gone; take down anything it left running so the
        // pipes close and nothing carries over into the next trial.
        if let Err(e) = kill_process_group(&mut child) {
            debug!("Could not clean up process group {}: {e}", child.id());
        }

        let input_delivered = fed_rx.recv_timeout(PIPE_CLOSE_GRACE).unwrap_or(false);
        if drained_rx.recv_timeout(PIPE_CLOSE_GRACE).is_err() {
            warn!("Target output still open after cleanup, keeping what was read so far");
        }
        let output = std::mem::take(&mut *lock_buffer(&captured));

        Ok(TrialResult {
            status,
            output,
            input_delivered,
            elapsed: start_time.elapsed(),
        })
    }
}

/// Sends SIGKILL to the child's whole process group. An already empty group
/// is not an error.
#[cfg(unix)]
fn kill_process_group(child: &mut Child) -> io::Result<()> {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    match killpg(Pid::from_raw(child.id() as i32), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(errno) => {
            debug!("killpg failed ({errno}), killing the direct child only");
            child.kill()
        }
    }
}

#[cfg(not(unix))]
fn kill_process_group(child: &mut Child) -> io::Result<()> {
    match child.try_wait() {
        Ok(Some(_)) => Ok(()),
        _ => child.kill(),
    }
}

fn lock_buffer(buffer: &Mutex<Vec<u8>>) -> std::sync::MutexGuard<'_, Vec<u8>> {
    buffer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Appends everything read from `reader` to `sink` chunk by chunk, so the
/// bytes read so far stay available even if EOF never comes.
fn drain_output(mut reader: os_pipe::PipeReader, sink: &Mutex<Vec<u8>>) {
    let mut chunk = [0u8; OUTPUT_CHUNK_SIZE];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => return,
            Ok(n) => lock_buffer(sink).extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                debug!("Output pipe read failed: {e}");
                return;
            }
        }
    }
}

/// Writes the whole input and closes the pipe. A child that exits without
/// reading is normal for a fuzz target, so a broken pipe is not an error.
fn deliver_input(mut stdin: ChildStdin, data: &[u8]) -> bool {
    let result = stdin.write_all(data).and_then(|_| stdin.flush());
    drop(stdin);
    match result {
        Ok(()) => true,
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("Target closed stdin early ({} bytes offered)", data.len());
            false
        }
        Err(e) => {
            warn!("Error writing to child stdin: {e}");
            false
        }
    }
}

/// Maps a process exit to one signed integer.
///
/// Unix signal deaths become `128 + signal`, the same value a shell reports.
/// Windows codes are read as unsigned so NTSTATUS failures stay above
/// `0xC0000000`.
fn normalise_exit(status: ExitStatus) -> i64 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return SIGNAL_EXIT_BASE + i64::from(signal);
        }
    }
    match status.code() {
        #[cfg(windows)]
        Some(code) => i64::from(code as u32),
        #[cfg(not(windows))]
        Some(code) => i64::from(code),
        None => -1,
    }
}
