//! Lifecycle of a single pipeline run.

use std::fmt;

/// Stage a pipeline run is in.
///
/// A run moves forward through the stages exactly once:
/// `Idle -> Discovering -> Fetching -> Aggregating -> Archiving -> Uploading -> Done`.
/// `Failed` can be entered from any stage that has started but not finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Idle,
    Discovering,
    Fetching,
    Aggregating,
    Archiving,
    Uploading,
    Done,
    Failed,
}

impl PipelineState {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Discovering => "discovering",
            PipelineState::Fetching => "fetching",
            PipelineState::Aggregating => "aggregating",
            PipelineState::Archiving => "archiving",
            PipelineState::Uploading => "uploading",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    /// The stage that follows on success, if any.
    pub fn next(self) -> Option<PipelineState> {
        match self {
            PipelineState::Idle => Some(PipelineState::Discovering),
            PipelineState::Discovering => Some(PipelineState::Fetching),
            PipelineState::Fetching => Some(PipelineState::Aggregating),
            PipelineState::Aggregating => Some(PipelineState::Archiving),
            PipelineState::Archiving => Some(PipelineState::Uploading),
            PipelineState::Uploading => Some(PipelineState::Done),
            PipelineState::Done | PipelineState::Failed => None,
        }
    }

    pub fn can_transition_to(self, to: PipelineState) -> bool {
        match to {
            PipelineState::Failed => !matches!(
                self,
                PipelineState::Idle | PipelineState::Done | PipelineState::Failed
            ),
            _ => self.next() == Some(to),
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
