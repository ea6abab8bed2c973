//! Helper to handle backend stdout/stderr output
//!
//! Output is always piped. Each non-blank line goes to the log writer tagged
//! `BACKEND` (stdout) or `BACKEND-ERR` (stderr); without a log writer the
//! lines are forwarded to tracing instead.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;

use shared::{component_info, component_warn, Component, LogWriter};

pub const STDOUT_LEVEL: &str = "BACKEND";
pub const STDERR_LEVEL: &str = "BACKEND-ERR";

/// Configure stdio for the backend process
pub fn configure_child_stdio(cmd: &mut tokio::process::Command) {
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped()).stdin(Stdio::null());
}

/// Spawn one task per piped stream that forwards lines until EOF.
/// Consuming the pipes also keeps the child from blocking on a full buffer.
pub fn spawn_output_consumers(child: &mut Child, log_writer: Option<LogWriter>) {
    if let Some(stdout) = child.stdout.take() {
        tokio::spawn(forward_lines(stdout, STDOUT_LEVEL, log_writer.clone()));
    }

    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(forward_lines(stderr, STDERR_LEVEL, log_writer));
    }
}

/// Read errors tolerated in a row before the stream is abandoned
const MAX_CONSECUTIVE_READ_ERRORS: u32 = 16;

/// Forward raw lines until EOF, replacing invalid UTF-8. The pipe must stay
/// open while the backend runs or its next write raises SIGPIPE.
async fn forward_lines<R>(stream: R, level: &'static str, log_writer: Option<LogWriter>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    let mut errors = 0;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                errors = 0;
                forward_line(&String::from_utf8_lossy(&buf), level, log_writer.as_ref());
            }
            Err(e) => {
                errors += 1;
                component_warn!(Component::Backend, "Error reading backend {}: {}", level, e);
                if errors >= MAX_CONSECUTIVE_READ_ERRORS {
                    component_warn!(Component::Backend, "Giving up on backend {}", level);
                    break;
                }
            }
        }
    }
}

fn forward_line(line: &str, level: &str, log_writer: Option<&LogWriter>) {
    let line = line.trim_end();
    if line.trim().is_empty() {
        return;
    }

    match log_writer {
        Some(writer) => writer.append(level, line),
        None => component_info!(Component::Backend, "[{}] {}", level, line),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::LogFileConfig;

    #[tokio::test]
    async fn test_forward_lines_skips_blank_lines() {
        let tmp = tempfile::TempDir::new().unwrap();
        let writer = LogWriter::open(LogFileConfig::new(tmp.path(), "qbox.log").with_console_echo(false)).unwrap();

        let output: &[u8] = b"Uvicorn running on http://127.0.0.1:8080\n\n   \r\nApplication startup complete.\r\n";
        forward_lines(output, STDERR_LEVEL, Some(writer.clone())).await;

        let contents = std::fs::read_to_string(writer.active_path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" - BACKEND-ERR - Uvicorn running on http://127.0.0.1:8080"));
        assert!(lines[1].ends_with(" - BACKEND-ERR - Application startup complete."));
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_stop_forwarding() {
        let tmp = tempfile::TempDir::new().unwrap();
        let writer = LogWriter::open(LogFileConfig::new(tmp.path(), "qbox.log").with_console_echo(false)).unwrap();

        let output: &[u8] = b"before\nbad \xff byte\nafter\nno trailing newline";
        forward_lines(output, STDOUT_LEVEL, Some(writer.clone())).await;

        let contents = std::fs::read_to_string(writer.active_path()).unwrap();
        let lines: Vec<_> = contents.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].ends_with(" - BACKEND - before"));
        assert!(lines[1].ends_with(" - BACKEND - bad \u{FFFD} byte"));
        assert!(lines[2].ends_with(" - BACKEND - after"));
        assert!(lines[3].ends_with(" - BACKEND - no trailing newline"));
    }
}
