//! Main entry point for the QBox supervisor binary
//!
//! Wires the real service implementations into the supervisor, holds the
//! single-instance lock for the lifetime of the process and bridges the UI's
//! JSON-lines IPC over stdin/stdout.

use clap::Parser;
use std::io::BufRead;
use std::process::ExitCode;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use shared::{component_info, component_warn, logging, Component, IpcCall, IpcOutbound, LogWriter};
use supervisor::{
    services::{
        wait_for_exit_signal, ExitReason, RealDesktopShell, RealHealthClient, RealProcessManager, RealUpdateClient,
        SessionGuard,
    },
    Args, Supervisor, SupervisorConfig, SupervisorError, SupervisorResult,
};

const IPC_QUEUE: usize = 32;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();

    // Parse command line arguments
    let args = Args::parse();
    let config = match SupervisorConfig::from_args(args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("qbox-supervisor: {e}");
            return ExitCode::FAILURE;
        }
    };

    // Log file first so even lock failures are recorded
    let log_writer = match LogWriter::open(config.log.clone()) {
        Ok(writer) => Some(writer),
        Err(e) => {
            eprintln!("qbox-supervisor: log file unavailable, logging to console only: {e}");
            None
        }
    };
    logging::init_tracing(Some(&config.log_level), log_writer.clone());
    logging::log_startup(
        Component::Supervisor,
        &format!("QBox supervisor {} (data dir: {})", env!("CARGO_PKG_VERSION"), config.data_dir.display()),
    );

    let session = match SessionGuard::acquire(&config.lock_path) {
        Ok(session) => session,
        Err(e @ (SupervisorError::AlreadyRunning { .. } | SupervisorError::AlreadyRunningNoMeta)) => {
            component_info!(Component::Session, "{}; exiting", e);
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            logging::log_error(Component::Session, "Instance lock", &e);
            return ExitCode::FAILURE;
        }
    };

    let code = match run(config, log_writer).await {
        Ok(reason) => {
            logging::log_shutdown(Component::Supervisor, &reason.to_string());
            ExitCode::SUCCESS
        }
        Err(e) => {
            logging::log_error(Component::Supervisor, "Supervisor", &e);
            ExitCode::FAILURE
        }
    };

    drop(session);
    code
}

async fn run(config: SupervisorConfig, log_writer: Option<LogWriter>) -> SupervisorResult<ExitReason> {
    // Initialize services
    let mut process_manager = RealProcessManager::new();
    if let Some(writer) = log_writer {
        process_manager = process_manager.with_log_writer(writer);
    }
    let update_client = RealUpdateClient::new(config.updates.feed.clone(), config.updates.download_dir.clone())?;

    // Create supervisor with dependency injection
    let mut supervisor = Supervisor::new(
        config,
        process_manager,
        RealHealthClient::new(),
        update_client,
        RealDesktopShell::new(),
    );

    // A quit signal during start-up abandons it
    let startup = tokio::select! {
        result = supervisor.start_up() => result,
        reason = wait_for_exit_signal() => {
            supervisor.shutdown().await?;
            return Ok(reason);
        }
    };

    if let Err(e) = startup {
        logging::log_error(Component::Supervisor, "Start-up", &e);
        // Only failures the user can act on get the blocking dialog
        if e.is_fatal_startup() {
            supervisor.report_fatal(&e);
        }
        if let Err(stop_err) = supervisor.shutdown().await {
            logging::log_error(Component::Backend, "Stopping backend", &stop_err);
        }
        return Err(e);
    }
    supervisor.load_main_app()?;

    // IPC bridge
    let (ipc_tx, ipc_rx) = mpsc::channel(IPC_QUEUE);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    spawn_ipc_reader(ipc_tx);
    let writer = tokio::spawn(write_ipc_messages(outbound_rx));

    // Set up graceful shutdown
    let shutdown_sender = supervisor.get_shutdown_sender();
    tokio::spawn(async move {
        let reason = wait_for_exit_signal().await;
        let _ = shutdown_sender.send(reason).await;
    });

    // Run main event loop
    let reason = supervisor.run(ipc_rx, outbound_tx).await?;
    supervisor.shutdown().await?;

    // The outbound sender went away with the event loop; let pending lines flush
    let _ = writer.await;
    logging::log_success(Component::Supervisor, "Supervisor stopped gracefully");
    Ok(reason)
}

/// Read IPC calls from stdin on a plain thread; a blocked stdin read must not
/// keep the runtime alive at exit.
fn spawn_ipc_reader(ipc_tx: mpsc::Sender<IpcCall>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    component_warn!(Component::Supervisor, "Stopped reading IPC input: {}", e);
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            match IpcCall::parse(&line) {
                Ok(call) => {
                    if ipc_tx.blocking_send(call).is_err() {
                        break;
                    }
                }
                Err(e) => component_warn!(Component::Supervisor, "Ignoring IPC line: {}", e),
            }
        }
    });
}

async fn write_ipc_messages(mut outbound_rx: mpsc::UnboundedReceiver<IpcOutbound>) {
    let mut stdout = tokio::io::stdout();
    while let Some(message) = outbound_rx.recv().await {
        let line = match message.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                component_warn!(Component::Supervisor, "Dropping IPC message: {}", e);
                continue;
            }
        };
        let written = async {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await
        };
        if let Err(e) = written.await {
            component_warn!(Component::Supervisor, "UI output closed: {}", e);
            break;
        }
    }
}
