use serde::Serialize;
use std::fmt;

/// Lifecycle of one estimation run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimationState {
    Converged,
    NotInitialised,
    Running,
    MaxIterationsExceeded,
    SingularMatrix,
    Interrupted,
}

impl EstimationState {
    /// Numeric state identifier, used as the batch exit code.
    pub fn id(self) -> i32 {
        match self {
            EstimationState::Converged => 0,
            EstimationState::NotInitialised => 1,
            EstimationState::Running => 2,
            EstimationState::MaxIterationsExceeded => 3,
            EstimationState::SingularMatrix => 4,
            EstimationState::Interrupted => 5,
        }
    }
}

impl fmt::Display for EstimationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EstimationState::Converged => "converged",
            EstimationState::NotInitialised => "not initialised",
            EstimationState::Running => "running",
            EstimationState::MaxIterationsExceeded => "maximum number of iterations exceeded",
            EstimationState::SingularMatrix => "singular normal equations",
            EstimationState::Interrupted => "interrupted",
        };
        f.write_str(name)
    }
}
