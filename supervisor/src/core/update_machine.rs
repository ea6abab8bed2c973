//! Update state machine
//!
//! Pure transition function over [`UpdateState`]. Every accepted transition
//! yields the next state and, when something observable changed, the event to
//! publish. Rejected transitions leave the caller's state untouched.

use shared::{Progress, UpdateEvent, UpdateInfo, UpdateState};

use crate::error::{SupervisorError, SupervisorResult};

/// Inputs that drive the update state machine
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateTransition {
    CheckStarted,
    Found(UpdateInfo),
    NotFound,
    Failed(String),
    DownloadStarted,
    Progressed(Progress),
    DownloadCompleted(UpdateInfo),
    Dismissed,
}

/// Result of an accepted transition
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub state: UpdateState,
    pub event: Option<UpdateEvent>,
}

impl Step {
    fn to(state: UpdateState, event: UpdateEvent) -> Self {
        Self { state, event: Some(event) }
    }

    fn unchanged(state: &UpdateState) -> Self {
        Self {
            state: state.clone(),
            event: None,
        }
    }
}

/// Compute the next state for `transition` applied to `state`
pub fn apply(state: &UpdateState, transition: UpdateTransition) -> SupervisorResult<Step> {
    use UpdateState as S;
    use UpdateTransition as T;

    match (state, transition) {
        (S::Idle | S::Error(_), T::CheckStarted) => Ok(Step::to(S::Checking, UpdateEvent::Checking)),
        (S::Checking, T::CheckStarted) => Err(SupervisorError::busy("check")),
        (S::Downloading(_), T::CheckStarted) => Err(SupervisorError::busy("download")),

        (S::Checking, T::Found(info)) => Ok(Step::to(S::Available(info.clone()), UpdateEvent::Available(info))),
        (S::Checking, T::NotFound) => Ok(Step::to(S::Idle, UpdateEvent::NotAvailable)),
        (S::Checking | S::Downloading(_), T::Failed(message)) => {
            Ok(Step::to(S::Error(message.clone()), UpdateEvent::Error(message)))
        }

        (S::Available(_), T::DownloadStarted) => {
            let initial = Progress::from_transfer(0, 0, std::time::Duration::ZERO);
            Ok(Step::to(S::Downloading(initial.clone()), UpdateEvent::Progress(initial)))
        }
        (S::Downloading(_), T::DownloadStarted) => Err(SupervisorError::busy("download")),
        (_, T::DownloadStarted) => Err(SupervisorError::usage("no update available to download", state)),

        (S::Downloading(previous), T::Progressed(progress)) => {
            // Samples can arrive out of order; progress never moves backwards
            if progress.transferred < previous.transferred {
                Ok(Step::unchanged(state))
            } else {
                Ok(Step::to(S::Downloading(progress.clone()), UpdateEvent::Progress(progress)))
            }
        }
        (S::Downloading(_), T::DownloadCompleted(info)) => {
            Ok(Step::to(S::Downloaded(info.clone()), UpdateEvent::Downloaded(info)))
        }

        (S::Available(_), T::Dismissed) => Ok(Step::to(S::Idle, UpdateEvent::Dismissed)),
        (_, T::Dismissed) => Ok(Step::unchanged(state)),

        (_, transition) => Err(SupervisorError::usage(
            format!("unexpected update transition {}", transition_name(&transition)),
            state,
        )),
    }
}

/// The update ready to install, or a usage error when nothing is downloaded
pub fn installable(state: &UpdateState) -> SupervisorResult<UpdateInfo> {
    match state {
        UpdateState::Downloaded(info) => Ok(info.clone()),
        other => Err(SupervisorError::usage("no downloaded update to install", other)),
    }
}

fn transition_name(transition: &UpdateTransition) -> &'static str {
    match transition {
        UpdateTransition::CheckStarted => "check-started",
        UpdateTransition::Found(_) => "found",
        UpdateTransition::NotFound => "not-found",
        UpdateTransition::Failed(_) => "failed",
        UpdateTransition::DownloadStarted => "download-started",
        UpdateTransition::Progressed(_) => "progressed",
        UpdateTransition::DownloadCompleted(_) => "download-completed",
        UpdateTransition::Dismissed => "dismissed",
    }
}
