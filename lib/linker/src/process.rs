//! External-tool spawning with deadlock-safe stream draining.
//!
//! Both output pipes are drained by dedicated threads that outlive the
//! process; `wait` runs before the drains are joined, so a chatty tool can
//! never fill a pipe buffer and stall.

use std::io::{self, Read};
use std::process::{Command, ExitStatus, Stdio};
use std::thread;

pub(crate) struct ToolOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }
}

fn drain<R: Read + Send + 'static>(reader: Option<R>) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buffer = String::new();
        if let Some(mut reader) = reader {
            let _ = reader.read_to_string(&mut buffer);
        }
        buffer
    })
}

/// Run a command to completion, capturing stderr and (unless suppressed)
/// stdout.
pub(crate) fn run_tool(command: &mut Command, suppress_stdout: bool) -> io::Result<ToolOutput> {
    command.stdin(Stdio::null());
    command.stdout(if suppress_stdout {
        Stdio::null()
    } else {
        Stdio::piped()
    });
    command.stderr(Stdio::piped());

    let mut child = command.spawn()?;
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());
    let status = child.wait()?;
    let stdout = stdout.join().unwrap_or_default();
    let stderr = stderr.join().unwrap_or_default();
    Ok(ToolOutput {
        status,
        stdout,
        stderr,
    })
}
