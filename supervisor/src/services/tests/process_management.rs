//! Tests for RealProcessManager against real `/bin/sh` children
//!
//! These cover exit status reporting, environment injection, output capture
//! into the log file and termination.

use std::time::Duration;
use tempfile::TempDir;

use shared::{LogFileConfig, LogWriter, ProcessStatus};

use super::common::{eventually, with_timeout};
use crate::config::BackendConfig;
use crate::error::SupervisorError;
use crate::services::process_manager::RealProcessManager;
use crate::traits::ProcessManager;

fn shell(script: &str, port: u16) -> BackendConfig {
    BackendConfig::new("/bin/sh", port).with_args(vec!["-c".to_string(), script.to_string()])
}

fn log_writer(dir: &TempDir) -> LogWriter {
    LogWriter::open(LogFileConfig::new(dir.path(), "qbox.log").with_console_echo(false)).unwrap()
}

#[tokio::test]
async fn test_exit_code_is_reported() {
    let manager = RealProcessManager::new();
    let process = manager.start(&shell("exit 3", 18101)).await.unwrap();

    let status = with_timeout(process.wait_for_exit()).await.unwrap();
    assert_eq!(status, ProcessStatus::Exited { code: 3 });
    assert!(status.is_failure());
    assert!(!process.is_running());
}

#[tokio::test]
async fn test_clean_exit_is_not_a_failure() {
    let manager = RealProcessManager::new();
    let process = manager.start(&shell("exit 0", 18102)).await.unwrap();

    let status = with_timeout(process.wait_for_exit()).await.unwrap();
    assert_eq!(status, ProcessStatus::Exited { code: 0 });
    assert!(!status.is_failure());
}

#[tokio::test]
async fn test_output_lands_in_log_with_port_injected() {
    let dir = TempDir::new().unwrap();
    let writer = log_writer(&dir);
    let manager = RealProcessManager::new().with_log_writer(writer.clone());

    let backend = shell(r#"echo "listening on $PORT in $QBOX_MODE"; echo; echo "database locked" >&2"#, 18103)
        .with_env("QBOX_MODE", "test");
    let process = manager.start(&backend).await.unwrap();
    with_timeout(process.wait_for_exit()).await.unwrap();

    let path = writer.active_path();
    let captured = eventually(|| {
        let contents = std::fs::read_to_string(&path).unwrap_or_default();
        contents.contains("database locked")
    })
    .await;
    assert!(captured, "stderr line never reached the log");

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<_> = contents.lines().collect();
    assert!(lines.iter().any(|l| l.ends_with(" - BACKEND - listening on 18103 in test")));
    assert!(lines.iter().any(|l| l.ends_with(" - BACKEND-ERR - database locked")));
    // The blank echo is skipped
    assert_eq!(lines.len(), 2);
}

#[tokio::test]
async fn test_invalid_utf8_output_keeps_backend_alive() {
    let dir = TempDir::new().unwrap();
    let writer = log_writer(&dir);
    let manager = RealProcessManager::new().with_log_writer(writer.clone());

    let script = r"echo before; printf 'bad \377 byte\n'; sleep 0.2; echo after; exit 0";
    let process = manager.start(&shell(script, 18107)).await.unwrap();

    let status = with_timeout(process.wait_for_exit()).await.unwrap();
    assert_eq!(status, ProcessStatus::Exited { code: 0 });

    let path = writer.active_path();
    let captured = eventually(|| {
        let contents = std::fs::read_to_string(&path).unwrap_or_default();
        contents.contains(" - BACKEND - after")
    })
    .await;
    assert!(captured, "line after invalid UTF-8 never reached the log");

    let contents = std::fs::read_to_string(&path).unwrap();
    assert!(contents.contains(" - BACKEND - before"));
    assert!(contents.contains(" - BACKEND - bad \u{FFFD} byte"));
}

#[tokio::test]
async fn test_stop_terminates_and_is_idempotent() {
    let manager = RealProcessManager::new().with_stop_grace(Duration::from_secs(1));
    let process = manager.start(&shell("exec sleep 30", 18104)).await.unwrap();
    assert!(process.is_running());
    assert!(process.pid().is_some());

    with_timeout(manager.stop(&process)).await.unwrap().unwrap();
    assert_eq!(process.status(), ProcessStatus::Signaled { signal: Some(15) });

    with_timeout(manager.stop(&process)).await.unwrap().unwrap();
    assert!(!process.is_running());
}

#[tokio::test]
async fn test_stop_kills_process_ignoring_sigterm() {
    let manager = RealProcessManager::new().with_stop_grace(Duration::from_millis(200));
    let process = manager
        .start(&shell("trap '' TERM; while true; do sleep 0.05; done", 18105))
        .await
        .unwrap();
    // Give the shell time to install its trap
    tokio::time::sleep(Duration::from_millis(100)).await;

    with_timeout(manager.stop(&process)).await.unwrap().unwrap();
    assert_eq!(process.status(), ProcessStatus::Signaled { signal: Some(9) });
}

#[tokio::test]
async fn test_missing_executable_fails_to_spawn() {
    let manager = RealProcessManager::new();
    let backend = BackendConfig::new("/nonexistent/qbox-backend", 18106);

    let result = manager.start(&backend).await;
    assert!(matches!(result, Err(SupervisorError::SpawnFailed { .. })));
}
