//! Child process execution with a deadline and bounded output capture.

use std::io::{Read, Write};
use std::process::{Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// Bytes kept from one output stream plus how many were dropped.
#[derive(Debug, Default)]
pub struct Captured {
    pub bytes: Vec<u8>,
    pub dropped: usize,
}

impl Captured {
    pub fn text(&self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.dropped > 0 {
            text.push_str(&format!("\n[output truncated, {} bytes dropped]", self.dropped));
        }
        text
    }
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: Option<ExitStatus>,
    pub stdout: Captured,
    pub stderr: Captured,
    pub timed_out: bool,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.is_some_and(|s| s.success())
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.status.and_then(|s| s.code())
    }
}

/// Run `argv`, feeding `stdin`, killing the child once `timeout` elapses.
///
/// Both pipes are drained on background threads while the child runs so a
/// chatty child cannot block on a full pipe. Only the first `limit` bytes of
/// each stream are retained.
#[instrument(skip_all, fields(program = argv.first().map(String::as_str), timeout_ms = timeout.as_millis() as u64))]
pub fn run_with_timeout(
    argv: &[String],
    stdin: &[u8],
    timeout: Duration,
    limit: usize,
) -> Result<ProcessOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command line"))?;
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("spawn {program}"))?;

    let stdout = spawn_reader(child.stdout.take(), limit)?;
    let stderr = spawn_reader(child.stderr.take(), limit)?;

    if let Some(mut pipe) = child.stdin.take() {
        // A child that exits without reading its input closes the pipe early.
        if let Err(err) = pipe.write_all(stdin) {
            debug!(%err, "child closed stdin before reading all input");
        }
    }

    let (status, timed_out) = match child.wait_timeout(timeout).context("wait for child")? {
        Some(status) => (Some(status), false),
        None => {
            warn!("child exceeded its deadline, killing");
            child.kill().context("kill child")?;
            (child.wait().ok(), true)
        }
    };

    let output = ProcessOutput {
        status,
        stdout: join_reader(stdout).context("collect stdout")?,
        stderr: join_reader(stderr).context("collect stderr")?,
        timed_out,
    };
    debug!(
        exit_code = ?output.exit_code(),
        timed_out,
        stdout_dropped = output.stdout.dropped,
        "child finished"
    );
    Ok(output)
}

fn spawn_reader<R>(pipe: Option<R>, limit: usize) -> Result<JoinHandle<Result<Captured>>>
where
    R: Read + Send + 'static,
{
    let mut pipe = pipe.ok_or_else(|| anyhow!("child pipe was not captured"))?;
    Ok(thread::spawn(move || {
        let mut captured = Captured::default();
        let mut chunk = [0u8; 8192];
        loop {
            let n = pipe.read(&mut chunk).context("read child output")?;
            if n == 0 {
                return Ok(captured);
            }
            let keep = n.min(limit.saturating_sub(captured.bytes.len()));
            captured.bytes.extend_from_slice(&chunk[..keep]);
            captured.dropped += n - keep;
        }
    }))
}

fn join_reader(handle: JoinHandle<Result<Captured>>) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}
