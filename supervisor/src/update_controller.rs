//! Self-update controller
//!
//! Wraps an [`UpdateClient`] with the update state machine, publishes every
//! transition on a broadcast channel and owns the check schedule: one delayed
//! check after setup plus an optional periodic check that only fires while the
//! controller is idle.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};

use shared::{component_debug, component_info, component_warn, Component, UpdateEvent, UpdateInfo, UpdateState};

use crate::config::UpdateConfig;
use crate::core::{apply, installable, UpdateTransition};
use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::UpdateClient;

const EVENT_CAPACITY: usize = 64;

struct ControllerInner<U> {
    client: U,
    config: UpdateConfig,
    state: Mutex<UpdateState>,
    events: broadcast::Sender<UpdateEvent>,

    /// Artifact produced by the last successful download
    artifact: Mutex<Option<PathBuf>>,
}

/// Outcome of trying to start a check while holding the state lock
enum CheckStart {
    Started,
    AlreadyKnown(UpdateInfo),
}

pub struct UpdateController<U: UpdateClient + 'static> {
    inner: Arc<ControllerInner<U>>,
    timers: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl<U: UpdateClient + 'static> Clone for UpdateController<U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            timers: Arc::clone(&self.timers),
        }
    }
}

impl<U: UpdateClient + 'static> UpdateController<U> {
    pub fn new(client: U, config: UpdateConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(ControllerInner {
                client,
                config,
                state: Mutex::new(UpdateState::Idle),
                events,
                artifact: Mutex::new(None),
            }),
            timers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &UpdateConfig {
        &self.inner.config
    }

    /// Snapshot of the current state
    pub fn get_state(&self) -> UpdateState {
        self.state().clone()
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<UpdateEvent> {
        self.inner.events.subscribe()
    }

    /// Start the check schedule. Does nothing when updates are disabled, in
    /// development mode, or when no feed is configured.
    pub fn setup(&self) {
        let config = &self.inner.config;
        if !config.enabled {
            component_info!(Component::Updater, "Update checks disabled");
            return;
        }
        if config.dev_mode {
            component_info!(Component::Updater, "Development mode, skipping update checks");
            return;
        }
        if config.feed.is_none() {
            component_info!(Component::Updater, "No update feed configured, staying idle");
            return;
        }

        let mut timers = self.timers();
        if !timers.is_empty() {
            component_debug!(Component::Updater, "Update schedule already running");
            return;
        }

        let initial_delay = config.initial_delay;
        let controller = self.clone();
        timers.push(tokio::spawn(async move {
            sleep(initial_delay).await;
            if let Err(e) = controller.check_for_updates().await {
                component_warn!(Component::Updater, "Initial update check failed: {}", e);
            }
        }));

        match config.check_interval.filter(|period| !period.is_zero()) {
            Some(period) => {
                let controller = self.clone();
                timers.push(tokio::spawn(async move {
                    let mut ticker = interval_at(Instant::now() + period, period);
                    loop {
                        ticker.tick().await;
                        controller.on_periodic_tick().await;
                    }
                }));
                component_info!(
                    Component::Updater,
                    "🔄 Update checks scheduled: first in {:?}, then every {:?}",
                    initial_delay,
                    period
                );
            }
            None => component_info!(
                Component::Updater,
                "🔄 Update check scheduled in {:?}, periodic checks disabled",
                initial_delay
            ),
        }
    }

    /// Cancel every pending timer
    pub fn shutdown(&self) {
        let mut timers = self.timers();
        for timer in timers.drain(..) {
            timer.abort();
        }
    }

    /// Periodic timer body; returns whether a check was attempted
    pub async fn on_periodic_tick(&self) -> bool {
        if !self.state().is_idle() {
            component_debug!(
                Component::Updater,
                "Skipping periodic update check while {}",
                self.get_state()
            );
            return false;
        }

        if let Err(e) = self.check_for_updates().await {
            component_warn!(Component::Updater, "Periodic update check failed: {}", e);
        }
        true
    }

    /// Ask the feed for a newer release
    pub async fn check_for_updates(&self) -> SupervisorResult<Option<UpdateInfo>> {
        self.ensure_checks_allowed()?;

        if let CheckStart::AlreadyKnown(info) = self.begin_check()? {
            return Ok(Some(info));
        }

        let inner = &self.inner;
        match inner.client.check(&inner.config.current_version).await {
            Ok(Some(info)) => {
                self.transition(UpdateTransition::Found(info.clone()))?;
                component_info!(Component::Updater, "✨ Update {} available", info.version);
                Ok(Some(info))
            }
            Ok(None) => {
                self.transition(UpdateTransition::NotFound)?;
                component_info!(Component::Updater, "QBox {} is up to date", inner.config.current_version);
                Ok(None)
            }
            Err(e) => {
                self.transition(UpdateTransition::Failed(e.to_string()))?;
                Err(e)
            }
        }
    }

    /// Menu-triggered check: tell the UI, then check
    pub async fn request_manual_check(&self) -> SupervisorResult<Option<UpdateInfo>> {
        self.publish(UpdateEvent::ManualCheckRequested);
        self.check_for_updates().await
    }

    /// Download the available update, publishing progress per chunk
    pub async fn download_update(&self) -> SupervisorResult<PathBuf> {
        let info = self.begin_download()?;
        component_info!(Component::Updater, "⬇️ Downloading update {}", info.version);

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let download = self.inner.client.download(&info, progress_tx);
        tokio::pin!(download);

        let result = loop {
            tokio::select! {
                biased;
                Some(progress) = progress_rx.recv() => self.record_progress(progress),
                result = &mut download => break result,
            }
        };
        while let Ok(progress) = progress_rx.try_recv() {
            self.record_progress(progress);
        }

        match result {
            Ok(artifact) => {
                *self.inner.artifact.lock().unwrap_or_else(|p| p.into_inner()) = Some(artifact.clone());
                self.transition(UpdateTransition::DownloadCompleted(info.clone()))?;
                component_info!(Component::Updater, "📦 Update {} downloaded to {}", info.version, artifact.display());
                Ok(artifact)
            }
            Err(e) => {
                self.transition(UpdateTransition::Failed(e.to_string()))?;
                Err(e)
            }
        }
    }

    /// Launch the installer for the downloaded update. The caller is expected
    /// to stop the backend and exit afterwards.
    pub async fn install_update(&self) -> SupervisorResult<UpdateInfo> {
        let info = installable(&self.state())?;
        let artifact = self
            .inner
            .artifact
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
            .ok_or_else(|| SupervisorError::usage("downloaded artifact is missing", &self.get_state()))?;

        self.inner.client.install(&artifact).await?;
        component_info!(Component::Updater, "🚀 Installing update {}", info.version);
        Ok(info)
    }

    /// `Available -> Idle`; no-op in every other state
    pub fn dismiss_update(&self) -> SupervisorResult<()> {
        self.transition(UpdateTransition::Dismissed).map(|_| ())
    }

    fn ensure_checks_allowed(&self) -> SupervisorResult<()> {
        let config = &self.inner.config;
        if !config.enabled {
            return Err(SupervisorError::update_config("update checks are disabled"));
        }
        if config.dev_mode {
            return Err(SupervisorError::update_config("update checks are unavailable in development mode"));
        }
        if config.feed.is_none() {
            return Err(SupervisorError::update_config("no update feed configured"));
        }
        Ok(())
    }

    fn begin_check(&self) -> SupervisorResult<CheckStart> {
        let mut state = self.state();
        match &*state {
            UpdateState::Available(info) => {
                self.publish(UpdateEvent::Available(info.clone()));
                Ok(CheckStart::AlreadyKnown(info.clone()))
            }
            UpdateState::Downloaded(info) => {
                self.publish(UpdateEvent::Downloaded(info.clone()));
                Ok(CheckStart::AlreadyKnown(info.clone()))
            }
            current => {
                let step = apply(current, UpdateTransition::CheckStarted)?;
                self.commit(&mut state, step.state, step.event);
                Ok(CheckStart::Started)
            }
        }
    }

    fn begin_download(&self) -> SupervisorResult<UpdateInfo> {
        let mut state = self.state();
        let step = apply(&state, UpdateTransition::DownloadStarted)?;
        let UpdateState::Available(info) = &*state else {
            return Err(SupervisorError::usage("no update available to download", &state));
        };
        let info = info.clone();
        self.commit(&mut state, step.state, step.event);
        Ok(info)
    }

    fn record_progress(&self, progress: shared::Progress) {
        if let Err(e) = self.transition(UpdateTransition::Progressed(progress)) {
            component_debug!(Component::Updater, "Dropped progress sample: {}", e);
        }
    }

    /// Apply a transition under the state lock and publish its event
    fn transition(&self, transition: UpdateTransition) -> SupervisorResult<UpdateState> {
        let mut state = self.state();
        let step = apply(&state, transition)?;
        let next = step.state.clone();
        self.commit(&mut state, step.state, step.event);
        Ok(next)
    }

    fn commit(&self, state: &mut MutexGuard<'_, UpdateState>, next: UpdateState, event: Option<UpdateEvent>) {
        if **state != next {
            component_debug!(Component::Updater, "Update state {} -> {}", **state, next);
        }
        **state = next;
        if let Some(event) = event {
            self.publish(event);
        }
    }

    fn publish(&self, event: UpdateEvent) {
        // No subscribers is fine; the UI may not be attached yet
        let _ = self.inner.events.send(event);
    }

    fn state(&self) -> MutexGuard<'_, UpdateState> {
        self.inner.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn timers(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(|p| p.into_inner())
    }
}
