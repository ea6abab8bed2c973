//! Main supervisor implementation
//!
//! Coordinates the backend process, the readiness gate, the update controller
//! and the IPC surface using dependency injection, so every collaborator can
//! be replaced by a mock in tests.

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{broadcast, mpsc};

use shared::{
    component_debug, component_error, component_info, component_warn, logging, Component, IpcCall, IpcOutbound,
    IpcReply, IpcRequest, IpcResponse, ProcessStatus,
};

use crate::config::SupervisorConfig;
use crate::error::{SupervisorError, SupervisorResult};
use crate::readiness::{ReadinessProber, ReadinessReport};
use crate::services::{ExitReason, ManagedProcess};
use crate::traits::{DesktopShell, HealthClient, ProcessManager, UpdateClient};
use crate::update_controller::UpdateController;

pub const FATAL_TITLE: &str = "QBox failed to start";

/// Lifecycle supervisor for the desktop application
pub struct Supervisor<P, H, U, S>
where
    P: ProcessManager + 'static,
    H: HealthClient + 'static,
    U: UpdateClient + 'static,
    S: DesktopShell + 'static,
{
    config: SupervisorConfig,

    /// Injected services
    process_manager: P,
    prober: ReadinessProber<H>,
    updates: UpdateController<U>,
    shell: S,

    /// Backend spawned by `start_up`; `None` in development mode
    backend: Option<ManagedProcess>,
    ready: bool,

    /// Shutdown signal
    shutdown_tx: mpsc::Sender<ExitReason>,
    shutdown_rx: Option<mpsc::Receiver<ExitReason>>,
}

impl<P, H, U, S> Supervisor<P, H, U, S>
where
    P: ProcessManager + 'static,
    H: HealthClient + 'static,
    U: UpdateClient + 'static,
    S: DesktopShell + 'static,
{
    /// Create new supervisor with injected dependencies
    pub fn new(config: SupervisorConfig, process_manager: P, health_client: H, update_client: U, shell: S) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(4);
        let prober = ReadinessProber::new(health_client, config.health.clone());
        let updates = UpdateController::new(update_client, config.updates.clone());

        Self {
            config,
            process_manager,
            prober,
            updates,
            shell,
            backend: None,
            ready: false,
            shutdown_tx,
            shutdown_rx: Some(shutdown_rx),
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    pub fn updates(&self) -> &UpdateController<U> {
        &self.updates
    }

    pub fn backend(&self) -> Option<&ManagedProcess> {
        self.backend.as_ref()
    }

    /// Get shutdown sender for external shutdown signaling
    pub fn get_shutdown_sender(&self) -> mpsc::Sender<ExitReason> {
        self.shutdown_tx.clone()
    }

    /// Launch the backend and wait until it is ready.
    ///
    /// A spawn failure, a failing backend exit or a liveness timeout is fatal
    /// and returned to the caller. In development mode the backend is expected
    /// to be running already and is only probed.
    pub async fn start_up(&mut self) -> SupervisorResult<ReadinessReport> {
        if self.config.dev_mode {
            component_info!(
                Component::Supervisor,
                "🧪 Development mode: waiting for external backend at {}",
                self.config.health.liveness_url()
            );
            let report = self.prober.wait_until_ready().await?;
            self.ready = true;
            return Ok(report);
        }

        let process = self.process_manager.start(&self.config.backend).await?;
        self.backend = Some(process.clone());

        // A clean or signalled exit keeps the same probe running to its deadline
        let readiness = self.prober.wait_until_ready();
        tokio::pin!(readiness);
        let report = tokio::select! {
            report = &mut readiness => report?,
            status = process.wait_for_exit() => {
                if status.is_failure() {
                    return Err(SupervisorError::BackendExited { status });
                }
                component_warn!(Component::Supervisor, "Backend {} during start-up", status);
                readiness.await?
            }
        };

        component_info!(
            Component::Supervisor,
            "✅ Backend ready in {:?} (liveness attempts: {}, readiness attempts: {}, api ready: {})",
            report.elapsed,
            report.liveness_attempts,
            report.readiness_attempts,
            report.api_ready
        );
        self.ready = true;
        Ok(report)
    }

    /// Unblock the UI and start the update schedule
    pub fn load_main_app(&mut self) -> SupervisorResult<()> {
        if !self.ready {
            return Err(SupervisorError::config("main app requested before backend start-up completed"));
        }

        self.updates.setup();
        logging::log_success(Component::Supervisor, "Main application loaded");
        Ok(())
    }

    /// Present a fatal start-up error to the user
    pub fn report_fatal(&self, error: &SupervisorError) {
        let message = format!(
            "{error}\n\nSee the logs in {} for details.",
            self.config.log_dir().display()
        );
        self.shell.show_fatal_error(FATAL_TITLE, &message);
    }

    /// Answer one IPC call
    pub async fn handle_ipc(&self, call: IpcCall) -> IpcReply {
        component_debug!(Component::Supervisor, "IPC call {}: {:?}", call.id, call.request);
        let result = match self.dispatch(call.request).await {
            Ok(response) => response,
            Err(e) => {
                component_warn!(Component::Supervisor, "IPC call {} failed: {}", call.id, e);
                IpcResponse::Error { message: e.to_string() }
            }
        };
        IpcReply { id: call.id, result }
    }

    async fn dispatch(&self, request: IpcRequest) -> SupervisorResult<IpcResponse> {
        match request {
            IpcRequest::ReportIssue => {
                self.shell.open_url(self.config.issue_url.as_str())?;
                Ok(IpcResponse::Ok)
            }
            IpcRequest::OpenLogsFolder => {
                self.shell.open_path(self.config.log_dir())?;
                Ok(IpcResponse::Ok)
            }
            IpcRequest::CheckForUpdates => {
                let info = self.updates.check_for_updates().await?;
                Ok(IpcResponse::Update { info })
            }
            IpcRequest::MenuCheckForUpdates => {
                let info = self.updates.request_manual_check().await?;
                Ok(IpcResponse::Update { info })
            }
            IpcRequest::DownloadUpdate => {
                self.updates.download_update().await?;
                Ok(IpcResponse::Ok)
            }
            IpcRequest::InstallUpdate => {
                self.updates.install_update().await?;
                if self.shutdown_tx.try_send(ExitReason::InstallUpdate).is_err() {
                    component_warn!(Component::Supervisor, "Shutdown already pending");
                }
                Ok(IpcResponse::Ok)
            }
            IpcRequest::DismissUpdate => {
                self.updates.dismiss_update()?;
                Ok(IpcResponse::Ok)
            }
            IpcRequest::GetUpdateState => Ok(IpcResponse::State {
                state: self.updates.get_state(),
            }),
        }
    }

    /// Main event loop - answers IPC calls, forwards update events and watches
    /// the backend until a shutdown is requested or the UI goes away.
    pub async fn run(
        &mut self,
        mut ipc_rx: mpsc::Receiver<IpcCall>,
        outbound_tx: mpsc::UnboundedSender<IpcOutbound>,
    ) -> SupervisorResult<ExitReason> {
        let mut shutdown_rx = self
            .shutdown_rx
            .take()
            .ok_or_else(|| SupervisorError::config("supervisor event loop is already running"))?;
        let mut events = self.updates.subscribe();
        let mut backend = self.backend.clone();
        let mut backend_lost = false;

        let reason = {
            let this = &*self;
            let mut pending = FuturesUnordered::new();

            loop {
                tokio::select! {
                    Some(reason) = shutdown_rx.recv() => break reason,

                    call = ipc_rx.recv() => match call {
                        Some(call) => pending.push(this.handle_ipc(call)),
                        None => break ExitReason::UiClosed,
                    },

                    Some(reply) = pending.next() => {
                        let _ = outbound_tx.send(IpcOutbound::Reply(reply));
                    },

                    event = events.recv() => match event {
                        Ok(event) => {
                            let _ = outbound_tx.send(IpcOutbound::Event(event));
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            component_warn!(Component::Supervisor, "UI fell behind, {} update events dropped", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => {}
                    },

                    status = wait_for_backend(backend.clone()) => {
                        component_error!(Component::Backend, "💥 Backend stopped unexpectedly ({})", status);
                        backend = None;
                        backend_lost = true;
                    },
                }
            }
        };

        if backend_lost {
            self.backend = None;
        }
        self.shutdown_rx = Some(shutdown_rx);
        component_info!(Component::Supervisor, "Leaving event loop: {}", reason);
        Ok(reason)
    }

    /// Cancel update timers and stop the backend. Safe to call more than once.
    pub async fn shutdown(&mut self) -> SupervisorResult<()> {
        component_debug!(Component::Supervisor, "🛑 Shutting down supervisor...");
        self.updates.shutdown();

        if let Some(backend) = self.backend.take() {
            self.process_manager.stop(&backend).await?;
        }
        Ok(())
    }
}

async fn wait_for_backend(backend: Option<ManagedProcess>) -> ProcessStatus {
    match backend {
        Some(process) => process.wait_for_exit().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Args, HealthCheckConfig};
    use crate::traits::{MockDesktopShell, MockHealthClient, MockProcessManager, MockUpdateClient, ProbeOutcome};
    use clap::Parser;
    use shared::UpdateState;
    use std::time::Duration;

    fn test_config(dev: bool) -> SupervisorConfig {
        let mut argv = vec!["qbox-supervisor", "--data-dir", "/tmp/qbox-supervisor-test", "--backend-path", "/opt/qbox/qbox-backend"];
        if dev {
            argv.push("--dev");
        }
        let mut config = SupervisorConfig::from_args(Args::try_parse_from(argv).unwrap()).unwrap();
        config.health = HealthCheckConfig {
            liveness_timeout: Duration::from_secs(5),
            ..HealthCheckConfig::for_port(config.backend.port)
        };
        config
    }

    fn healthy_client() -> MockHealthClient {
        let mut health = MockHealthClient::new();
        health.expect_probe().returning(|_, _| ProbeOutcome::Healthy(200));
        health
    }

    #[tokio::test]
    async fn test_dev_mode_probes_without_spawning() {
        let mut process_manager = MockProcessManager::new();
        process_manager.expect_start().never();

        let mut supervisor = Supervisor::new(
            test_config(true),
            process_manager,
            healthy_client(),
            MockUpdateClient::new(),
            MockDesktopShell::new(),
        );

        let report = supervisor.start_up().await.unwrap();
        assert!(report.api_ready);
        assert!(supervisor.backend().is_none());
        assert!(supervisor.load_main_app().is_ok());
    }

    #[tokio::test]
    async fn test_load_main_app_requires_start_up() {
        let mut supervisor = Supervisor::new(
            test_config(false),
            MockProcessManager::new(),
            MockHealthClient::new(),
            MockUpdateClient::new(),
            MockDesktopShell::new(),
        );

        assert!(supervisor.load_main_app().is_err());
    }

    #[tokio::test]
    async fn test_failing_backend_exit_rejects_start_up() {
        let mut process_manager = MockProcessManager::new();
        process_manager.expect_start().returning(|backend| {
            let (process, monitor) = ManagedProcess::channel(Some(4242), backend.executable.clone(), backend.port);
            monitor.report_exit(ProcessStatus::Exited { code: 3 });
            Ok(process)
        });
        let mut health = MockHealthClient::new();
        health
            .expect_probe()
            .returning(|_, _| ProbeOutcome::Unreachable("connection refused".to_string()));

        let mut supervisor = Supervisor::new(
            test_config(false),
            process_manager,
            health,
            MockUpdateClient::new(),
            MockDesktopShell::new(),
        );

        let result = supervisor.start_up().await;
        assert!(matches!(
            result,
            Err(SupervisorError::BackendExited {
                status: ProcessStatus::Exited { code: 3 }
            })
        ));
    }

    #[tokio::test]
    async fn test_ipc_get_state_and_report_issue() {
        let mut shell = MockDesktopShell::new();
        shell
            .expect_open_url()
            .withf(|url| url.ends_with("/issues/new"))
            .times(1)
            .returning(|_| Ok(()));

        let supervisor = Supervisor::new(
            test_config(false),
            MockProcessManager::new(),
            MockHealthClient::new(),
            MockUpdateClient::new(),
            shell,
        );

        let reply = supervisor
            .handle_ipc(IpcCall {
                id: 1,
                request: IpcRequest::GetUpdateState,
            })
            .await;
        assert_eq!(
            reply.result,
            IpcResponse::State {
                state: UpdateState::Idle
            }
        );

        let reply = supervisor
            .handle_ipc(IpcCall {
                id: 2,
                request: IpcRequest::ReportIssue,
            })
            .await;
        assert_eq!(reply, IpcReply { id: 2, result: IpcResponse::Ok });
    }

    #[tokio::test]
    async fn test_ipc_errors_become_error_replies() {
        let supervisor = Supervisor::new(
            test_config(false),
            MockProcessManager::new(),
            MockHealthClient::new(),
            MockUpdateClient::new(),
            MockDesktopShell::new(),
        );

        let reply = supervisor
            .handle_ipc(IpcCall {
                id: 9,
                request: IpcRequest::InstallUpdate,
            })
            .await;
        match reply.result {
            IpcResponse::Error { message } => assert!(message.contains("no downloaded update to install")),
            other => panic!("expected error reply, got {other:?}"),
        }
    }
}
