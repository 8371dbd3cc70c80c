//! Helpers for running child processes with timeouts, cancellation, and bounded output.

use std::io::{self, ErrorKind, Read, Write};
use std::mem;
use std::process::{ChildStdin, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

use crate::runtime::module::CancellationSignal;

/// How often a waiting child is checked for cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long output pipes may stay open after the child has been killed.
const DRAIN_GRACE: Duration = Duration::from_millis(200);

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub stdout_truncated: usize,
    pub stderr_truncated: usize,
    pub timed_out: bool,
    pub cancelled: bool,
}

impl CommandOutput {
    /// Lossy stderr text with a truncation marker when bytes were dropped.
    pub fn stderr_text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stderr_truncated > 0 {
            text.push_str(&format!(" [stderr truncated {} bytes]", self.stderr_truncated));
        }
        text
    }
}

/// Run a command to completion, timeout, or cancellation.
///
/// stdin is fed and stdout/stderr are drained on their own threads while the
/// child runs, so neither a child that ignores its input nor a full pipe can
/// hold up the deadline. `output_limit_bytes` bounds what is kept in memory.
/// Pipes still held open after the child is gone (a grandchild that inherited
/// them) are abandoned once the drain deadline passes, keeping what was read.
/// Spawn failures are returned as the underlying `io::Error` (reachable with
/// `downcast_ref`) so callers can classify them.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
    cancel: &CancellationSignal,
) -> Result<CommandOutput> {
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = cmd.spawn()?;

    let (done_tx, done_rx) = mpsc::channel();
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_capture = spawn_reader(Pipe::Stdout, stdout, output_limit_bytes, done_tx.clone());
    let stderr_capture = spawn_reader(Pipe::Stderr, stderr, output_limit_bytes, done_tx.clone());
    let mut pending = 2;

    if let Some(input) = stdin {
        let child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        spawn_writer(child_stdin, input.to_vec(), done_tx.clone());
        pending += 1;
    }
    drop(done_tx);

    let deadline = Instant::now() + timeout;
    let mut timed_out = false;
    let mut cancelled = false;
    let status = loop {
        let now = Instant::now();
        if now >= deadline {
            timed_out = true;
        } else if cancel.is_cancelled() {
            cancelled = true;
        }
        if timed_out || cancelled {
            warn!(timed_out, cancelled, "stopping child process");
            child.kill().context("kill command")?;
            break child.wait().context("wait command after kill")?;
        }
        let slice = CANCEL_POLL_INTERVAL.min(deadline - now);
        if let Some(status) = child.wait_timeout(slice).context("wait for command")? {
            break status;
        }
    };

    let stopped = timed_out || cancelled;
    let drain_deadline = if stopped {
        Instant::now() + DRAIN_GRACE
    } else {
        deadline.max(Instant::now() + DRAIN_GRACE)
    };
    let mut stdin_error = None;
    while pending > 0 {
        let now = Instant::now();
        if now >= drain_deadline || (!stopped && cancel.is_cancelled()) {
            warn!(pending, "abandoning child pipes still held open");
            break;
        }
        match done_rx.recv_timeout(CANCEL_POLL_INTERVAL.min(drain_deadline - now)) {
            Ok((pipe, outcome)) => {
                pending -= 1;
                match (pipe, outcome) {
                    (_, Ok(())) => {}
                    (Pipe::Stdin, Err(err)) => stdin_error = Some(err),
                    (pipe, Err(err)) => {
                        return Err(err).with_context(|| format!("read {}", pipe.as_str()));
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    if let Some(err) = stdin_error
        && !stopped
    {
        return Err(err).context("write stdin");
    }

    let stdout = take_capture(&stdout_capture);
    let stderr = take_capture(&stderr_capture);
    if stdout.truncated > 0 || stderr.truncated > 0 {
        warn!(
            stdout_truncated = stdout.truncated,
            stderr_truncated = stderr.truncated,
            "output truncated"
        );
    }

    debug!(exit_code = ?status.code(), timed_out, cancelled, "command finished");
    Ok(CommandOutput {
        status,
        stdout: stdout.bytes,
        stderr: stderr.bytes,
        stdout_truncated: stdout.truncated,
        stderr_truncated: stderr.truncated,
        timed_out,
        cancelled,
    })
}

#[derive(Debug, Clone, Copy)]
enum Pipe {
    Stdin,
    Stdout,
    Stderr,
}

impl Pipe {
    fn as_str(self) -> &'static str {
        match self {
            Pipe::Stdin => "stdin",
            Pipe::Stdout => "stdout",
            Pipe::Stderr => "stderr",
        }
    }
}

type PipeDone = mpsc::Sender<(Pipe, io::Result<()>)>;

/// Bytes kept from one output stream plus the count of bytes dropped.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: usize,
}

type SharedCapture = Arc<Mutex<Captured>>;

fn spawn_writer(mut child_stdin: ChildStdin, input: Vec<u8>, done: PipeDone) {
    thread::spawn(move || {
        // A child that exits without reading its input is not an error here.
        let outcome = match child_stdin.write_all(&input) {
            Err(err) if err.kind() != ErrorKind::BrokenPipe => Err(err),
            _ => Ok(()),
        };
        drop(child_stdin);
        let _ = done.send((Pipe::Stdin, outcome));
    });
}

fn spawn_reader<R: Read + Send + 'static>(
    pipe: Pipe,
    reader: R,
    limit: usize,
    done: PipeDone,
) -> SharedCapture {
    let capture = SharedCapture::default();
    let sink = capture.clone();
    thread::spawn(move || {
        let outcome = read_stream_limited(reader, limit, &sink);
        let _ = done.send((pipe, outcome));
    });
    capture
}

fn take_capture(capture: &SharedCapture) -> Captured {
    mem::take(&mut *capture.lock().unwrap_or_else(PoisonError::into_inner))
}

fn read_stream_limited<R: Read>(
    mut reader: R,
    limit: usize,
    capture: &SharedCapture,
) -> io::Result<()> {
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk)?;
        if n == 0 {
            return Ok(());
        }
        let mut captured = capture.lock().unwrap_or_else(PoisonError::into_inner);
        let remaining = limit.saturating_sub(captured.bytes.len());
        let keep = n.min(remaining);
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.truncated += n - keep;
    }
}
