//! Error types for the function-learning trial engine

use std::fmt;

use thiserror::Error;

/// Named stages of the bootstrap pipeline, used to tag failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BootstrapStage {
    CreateAgent,
    PollTransmissions,
    FetchInfo,
    DecodeStimuli,
    PlanTests,
}

impl BootstrapStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BootstrapStage::CreateAgent => "create_agent",
            BootstrapStage::PollTransmissions => "poll_transmissions",
            BootstrapStage::FetchInfo => "fetch_info",
            BootstrapStage::DecodeStimuli => "decode_stimuli",
            BootstrapStage::PlanTests => "plan_tests",
        }
    }
}

impl fmt::Display for BootstrapStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while bootstrapping or running a session
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Bootstrap failed at {stage}: {message}")]
    Bootstrap {
        stage: BootstrapStage,
        message: String,
    },

    #[error("Malformed training set: {0}")]
    MalformedTrainingSet(String),

    #[error("Not enough distinct training values: need {needed}, have {available}")]
    InsufficientTrainingValues { needed: usize, available: usize },

    #[error("Not enough novel values in 1..={x_max}: need {needed}, have {available}")]
    InsufficientNovelValues {
        x_max: u32,
        needed: usize,
        available: usize,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Failed to report results: {0}")]
    Reporting(String),

    #[error("Session is not in a state that allows this: {0}")]
    InvalidState(String),
}

impl SessionError {
    /// Wrap an error as a failure of the given bootstrap stage
    pub fn at_stage(stage: BootstrapStage, err: impl fmt::Display) -> Self {
        SessionError::Bootstrap {
            stage,
            message: err.to_string(),
        }
    }

    /// Whether this error leaves the session waiting for stimuli
    pub fn is_bootstrap_failure(&self) -> bool {
        matches!(
            self,
            SessionError::Bootstrap { .. }
                | SessionError::MalformedTrainingSet(_)
                | SessionError::InsufficientTrainingValues { .. }
                | SessionError::InsufficientNovelValues { .. }
        )
    }
}
