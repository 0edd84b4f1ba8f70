//! Forward-only state machine for a single release run
//!
//! A run moves through the four steps in order and ends in `Published` or
//! `Failed`. There is no way back: a failed run is restarted from scratch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Release run state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReleaseState {
    Start,
    CredentialsWritten,
    VersionStamped,
    Built,
    Published,
    Failed,
}

impl ReleaseState {
    /// The only state a successful step may move to from here
    pub fn next(self) -> Option<ReleaseState> {
        match self {
            Self::Start => Some(Self::CredentialsWritten),
            Self::CredentialsWritten => Some(Self::VersionStamped),
            Self::VersionStamped => Some(Self::Built),
            Self::Built => Some(Self::Published),
            Self::Published | Self::Failed => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Published | Self::Failed)
    }
}

/// State transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StateTransition {
    pub from: ReleaseState,
    pub to: ReleaseState,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Rejected transition
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("illegal release state transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: ReleaseState,
    pub to: ReleaseState,
}

/// State machine for tracking a release run
#[derive(Debug)]
pub struct ReleaseStateMachine {
    current_state: ReleaseState,
    transitions: Vec<StateTransition>,
}

impl Default for ReleaseStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ReleaseStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: ReleaseState::Start,
            transitions: Vec::new(),
        }
    }

    /// Advance to the next state after a successful step
    pub fn advance(&mut self, to: ReleaseState) -> Result<(), InvalidTransition> {
        if self.current_state.next() != Some(to) {
            return Err(InvalidTransition {
                from: self.current_state,
                to,
            });
        }
        self.record(to, None);
        Ok(())
    }

    /// Move to `Failed` from any non-terminal state
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        if self.current_state.is_terminal() {
            return Err(InvalidTransition {
                from: self.current_state,
                to: ReleaseState::Failed,
            });
        }
        self.record(ReleaseState::Failed, Some(error.into()));
        Ok(())
    }

    fn record(&mut self, to: ReleaseState, error: Option<String>) {
        tracing::debug!(from = ?self.current_state, ?to, "release state transition");
        self.transitions.push(StateTransition {
            from: self.current_state,
            to,
            timestamp: Utc::now(),
            error,
        });
        self.current_state = to;
    }

    pub fn state(&self) -> ReleaseState {
        self.current_state
    }

    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }

    /// Last error message (if failed)
    pub fn last_error(&self) -> Option<&str> {
        self.transitions
            .iter()
            .rev()
            .find_map(|t| t.error.as_deref())
    }

    /// Milliseconds between the first and the last transition
    pub fn elapsed_ms(&self) -> i64 {
        match (self.transitions.first(), self.transitions.last()) {
            (Some(first), Some(last)) => (last.timestamp - first.timestamp).num_milliseconds(),
            _ => 0,
        }
    }

    /// Get transition history as human-readable string
    pub fn history(&self) -> String {
        self.transitions
            .iter()
            .map(|t| {
                let time = t.timestamp.to_rfc3339();
                match &t.error {
                    Some(error) => format!("{}: {:?} → {:?} ({})", time, t.from, t.to, error),
                    None => format!("{}: {:?} → {:?}", time, t.from, t.to),
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
