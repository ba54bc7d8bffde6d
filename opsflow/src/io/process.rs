//! Child process execution with a timeout and bounded output capture.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Captured child process output.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Bytes of stdout discarded beyond the capture limit.
    pub stdout_truncated: usize,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Last line of stderr, for error messages.
    pub fn stderr_tail(&self) -> String {
        String::from_utf8_lossy(&self.stderr)
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// Run `cmd`, feed `stdin`, and wait at most `timeout`.
///
/// stdout and stderr are drained on reader threads while the child runs so a
/// chatty child cannot deadlock on a full pipe. At most `output_limit_bytes`
/// of each stream are kept. On timeout the child is killed and reaped.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), output_limit_bytes))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = cmd.spawn().context("spawn command")?;

    if let Some(input) = stdin {
        let mut child_stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("stdin was not piped"))?;
        // Dropping the handle closes the pipe so the child sees EOF.
        child_stdin.write_all(input).context("write stdin")?;
    }

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;
    let stdout_handle = thread::spawn(move || read_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match child.wait_timeout(timeout).context("wait for command")? {
        Some(status) => status,
        None => {
            warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
            timed_out = true;
            child.kill().context("kill command")?;
            child.wait().context("wait command after kill")?
        }
    };

    let (stdout, stdout_truncated) = join_reader(stdout_handle).context("join stdout")?;
    let (stderr, _) = join_reader(stderr_handle).context("join stderr")?;
    if stdout_truncated > 0 {
        warn!(stdout_truncated, "command output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        timed_out,
    })
}

fn join_reader(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

fn read_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let keep = n.min(limit.saturating_sub(buf.len()));
        buf.extend_from_slice(&chunk[..keep]);
        truncated += n - keep;
    }

    Ok((buf, truncated))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_from_stdin() {
        let output = run_command_with_timeout(
            Command::new("cat"),
            Some(b"hello"),
            Duration::from_secs(5),
            1024,
        )
        .expect("run");
        assert!(output.status.success());
        assert_eq!(output.stdout_lossy(), "hello");
        assert!(!output.timed_out);
    }

    #[test]
    fn truncates_beyond_limit() {
        let output =
            run_command_with_timeout(Command::new("cat"), Some(b"abcdef"), Duration::from_secs(5), 3)
                .expect("run");
        assert_eq!(output.stdout, b"abc");
        assert_eq!(output.stdout_truncated, 3);
    }

    #[test]
    fn kills_on_timeout() {
        let mut cmd = Command::new("sleep");
        cmd.arg("5");
        let output =
            run_command_with_timeout(cmd, None, Duration::from_millis(100), 1024).expect("run");
        assert!(output.timed_out);
    }
}
