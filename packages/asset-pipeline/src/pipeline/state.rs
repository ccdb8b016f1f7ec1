//! Per-source state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::analysis::Outcome;

/// Where a source is in the pipeline.
///
/// `Pending → Fetching → Extracting → Analyzing → {Succeeded | Failed | NoData}`,
/// with `Failed` reachable from every working state and `Cancelled` from
/// every non-terminal one. Terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    Pending,
    Fetching,
    Extracting,
    Analyzing,
    Succeeded,
    Failed,
    NoData,
    Cancelled,
}

impl SourceState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::NoData | Self::Cancelled
        )
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition_to(&self, next: SourceState) -> bool {
        use SourceState::*;

        match (self, next) {
            (s, _) if s.is_terminal() => false,
            (_, Cancelled) => true,
            (Pending, Fetching) => true,
            (Fetching, Extracting) => true,
            // A cached analysis skips straight to the end.
            (Fetching, Succeeded | NoData) => true,
            (Extracting, Analyzing) => true,
            (Analyzing, Succeeded | NoData) => true,
            (Fetching | Extracting | Analyzing, Failed) => true,
            _ => false,
        }
    }

    /// Terminal state for a finished result.
    pub fn from_outcome(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Succeeded => Self::Succeeded,
            Outcome::Failed => Self::Failed,
            Outcome::NoData => Self::NoData,
            Outcome::Cancelled => Self::Cancelled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Analyzing => "analyzing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::NoData => "no_data",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one source's progress and rejects illegal transitions.
#[derive(Debug, Clone)]
pub struct SourceProgress {
    state: SourceState,
    history: Vec<SourceState>,
}

impl Default for SourceProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceProgress {
    pub fn new() -> Self {
        Self {
            state: SourceState::Pending,
            history: vec![SourceState::Pending],
        }
    }

    pub fn state(&self) -> SourceState {
        self.state
    }

    /// Every state visited, in order.
    pub fn history(&self) -> &[SourceState] {
        &self.history
    }

    /// Move to `next`. Returns `false` and stays put if the move is illegal.
    pub fn advance(&mut self, next: SourceState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.history.push(next);
        true
    }
}
