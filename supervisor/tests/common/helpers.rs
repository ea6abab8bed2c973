//! Test helpers and builder patterns for supervisor tests
//!
//! This module provides convenient helper functions and builder patterns
//! to reduce test boilerplate and improve maintainability.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

use shared::{IpcCall, IpcOutbound, IpcReply, IpcRequest, ProcessStatus, UpdateEvent};
use supervisor::services::process_manager::{ManagedProcess, ProcessMonitor};
use supervisor::traits::{MockDesktopShell, MockHealthClient, MockProcessManager, MockUpdateClient};
use supervisor::{ProbeOutcome, Supervisor, SupervisorConfig};

use super::fixtures::TestFixtures;

pub type TestSupervisor = Supervisor<MockProcessManager, MockHealthClient, MockUpdateClient, MockDesktopShell>;

/// Monitors of fake backends that are still "running"
pub type BackendMonitors = Arc<Mutex<Vec<ProcessMonitor>>>;

/// Builder pattern for creating test supervisors with sensible defaults
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    process_manager: MockProcessManager,
    health: MockHealthClient,
    updates: MockUpdateClient,
    shell: MockDesktopShell,
}

impl SupervisorBuilder {
    /// Create a new builder with a healthy backend and no update traffic
    pub fn new(data_dir: &Path) -> Self {
        Self {
            config: TestFixtures::config(data_dir),
            process_manager: MockProcessManager::new(),
            health: TestHelpers::healthy_client(),
            updates: MockUpdateClient::new(),
            shell: MockDesktopShell::new(),
        }
    }

    pub fn with_config(mut self, adjust: impl FnOnce(&mut SupervisorConfig)) -> Self {
        adjust(&mut self.config);
        self
    }

    pub fn with_process_manager(mut self, process_manager: MockProcessManager) -> Self {
        self.process_manager = process_manager;
        self
    }

    pub fn with_health_client(mut self, health: MockHealthClient) -> Self {
        self.health = health;
        self
    }

    pub fn with_update_client(mut self, updates: MockUpdateClient) -> Self {
        self.updates = updates;
        self
    }

    pub fn with_shell(mut self, shell: MockDesktopShell) -> Self {
        self.shell = shell;
        self
    }

    pub fn build(self) -> TestSupervisor {
        Supervisor::new(self.config, self.process_manager, self.health, self.updates, self.shell)
    }
}

/// Helper functions for common test operations
pub struct TestHelpers;

impl TestHelpers {
    /// Every probe succeeds
    pub fn healthy_client() -> MockHealthClient {
        let mut health = MockHealthClient::new();
        health.expect_probe().returning(|_, _| ProbeOutcome::Healthy(200));
        health
    }

    /// Every probe is refused
    pub fn unreachable_client() -> MockHealthClient {
        let mut health = MockHealthClient::new();
        health
            .expect_probe()
            .returning(|_, _| ProbeOutcome::Unreachable("connection refused".to_string()));
        health
    }

    /// A backend that has already finished with `status` when `start` returns
    pub fn backend_exiting_with(status: ProcessStatus) -> MockProcessManager {
        let mut process_manager = MockProcessManager::new();
        process_manager.expect_start().times(1).returning(move |backend| {
            let (process, monitor) = ManagedProcess::channel(Some(4242), backend.executable.clone(), backend.port);
            monitor.report_exit(status);
            Ok(process)
        });
        process_manager.expect_stop().returning(|_| Ok(()));
        process_manager
    }

    /// A backend that keeps running until `stop`, which reports SIGTERM
    pub fn running_backend() -> (MockProcessManager, BackendMonitors) {
        let monitors: BackendMonitors = Arc::default();
        let mut process_manager = MockProcessManager::new();

        let started = Arc::clone(&monitors);
        process_manager.expect_start().times(1).returning(move |backend| {
            let (process, monitor) = ManagedProcess::channel(Some(4242), backend.executable.clone(), backend.port);
            started.lock().unwrap().push(monitor);
            Ok(process)
        });

        let stopped = Arc::clone(&monitors);
        process_manager.expect_stop().times(1).returning(move |_| {
            for monitor in stopped.lock().unwrap().drain(..) {
                monitor.report_exit(ProcessStatus::Signaled { signal: Some(15) });
            }
            Ok(())
        });

        (process_manager, monitors)
    }
}

/// Drives a supervisor's IPC surface the way the UI does
pub struct IpcHarness {
    pub ipc_tx: Option<mpsc::Sender<IpcCall>>,
    pub outbound_rx: mpsc::UnboundedReceiver<IpcOutbound>,
    next_id: u64,
}

impl IpcHarness {
    /// Channels for `Supervisor::run` plus the harness holding the other ends
    pub fn new() -> (Self, mpsc::Receiver<IpcCall>, mpsc::UnboundedSender<IpcOutbound>) {
        let (ipc_tx, ipc_rx) = mpsc::channel(8);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let harness = Self {
            ipc_tx: Some(ipc_tx),
            outbound_rx,
            next_id: 1,
        };
        (harness, ipc_rx, outbound_tx)
    }

    /// Send a request and wait for its reply, collecting the events seen meanwhile
    pub async fn call(&mut self, request: IpcRequest) -> (IpcReply, Vec<UpdateEvent>) {
        let id = self.next_id;
        self.next_id += 1;

        let sender = self.ipc_tx.as_ref().expect("UI channel already closed");
        sender.send(IpcCall { id, request }).await.expect("supervisor stopped reading IPC");

        let mut events = Vec::new();
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), self.outbound_rx.recv())
                .await
                .expect("no reply within 5s")
                .expect("supervisor closed its output");
            match message {
                IpcOutbound::Reply(reply) if reply.id == id => return (reply, events),
                IpcOutbound::Reply(other) => panic!("unexpected reply {other:?}"),
                IpcOutbound::Event(event) => events.push(event),
            }
        }
    }

    /// Read output until an event matching `predicate` arrives
    pub async fn wait_for_event(&mut self, predicate: impl Fn(&UpdateEvent) -> bool) -> UpdateEvent {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), self.outbound_rx.recv())
                .await
                .expect("expected event not published within 5s")
                .expect("supervisor closed its output");
            if let IpcOutbound::Event(event) = message {
                if predicate(&event) {
                    return event;
                }
            }
        }
    }

    /// Simulate the UI going away
    pub fn close(&mut self) {
        self.ipc_tx = None;
    }
}
