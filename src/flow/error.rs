//! Errors raised by the flow layer.
//!
//! Leaf validation problems never show up here: a leaf rejects bad input by
//! telling the collaborator and staying suspended. Everything in `FlowError`
//! is fatal to the process tree and ends the game session.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowError>;

#[derive(Debug, Error)]
pub enum FlowError {
    /// A session was driven after its process tree completed.
    #[error("Process already completed")]
    Finished,

    /// A session was driven before it was started.
    #[error("Process has not been started")]
    NotStarted,

    #[error("Sequence needs at least one stage")]
    EmptySequence,

    #[error("Stage {stage} out of range for sequence of {len}")]
    StageOutOfRange { stage: usize, len: usize },

    #[error("Race needs at least one branch")]
    EmptyRace,

    #[error("Process already started")]
    AlreadyStarted,

    #[error("No session with id {0}")]
    UnknownSession(String),

    /// A loop body kept completing without consuming events.
    #[error("Loop restarted {0} times without consuming an event")]
    Spin(usize),

    #[error("Frame serialization failed: {0}")]
    State(#[from] serde_json::Error),

    /// Unexpected failure inside a leaf or continuation.
    #[error("{0}")]
    Failed(String),
}

impl FlowError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
