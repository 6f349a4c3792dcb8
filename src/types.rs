//! Core data types
//!
//! This module defines the types that flow between the stimulus source, the
//! trial state machine, and the result sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionError;

/// One `(x, y)` pair of the function being learned
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrainingPair {
    /// Input magnitude in base units
    pub x: f64,
    /// True output magnitude in base units
    pub y: f64,
}

/// Column-oriented wire form used by the experiment server: `{"x": [..], "y": [..]}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingColumns {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Ordered, immutable training data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TrainingColumns", into = "TrainingColumns")]
pub struct TrainingSet {
    pairs: Vec<TrainingPair>,
}

impl TrainingSet {
    /// Build a training set, rejecting empty or non-finite data
    pub fn new(pairs: Vec<TrainingPair>) -> Result<Self, SessionError> {
        if pairs.is_empty() {
            return Err(SessionError::MalformedTrainingSet(
                "training set is empty".to_string(),
            ));
        }
        if let Some(bad) = pairs.iter().position(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(SessionError::MalformedTrainingSet(format!(
                "non-finite value at index {bad}"
            )));
        }
        Ok(Self { pairs })
    }

    /// Build from parallel `x` and `y` columns
    pub fn from_columns(x: Vec<f64>, y: Vec<f64>) -> Result<Self, SessionError> {
        if x.len() != y.len() {
            return Err(SessionError::MalformedTrainingSet(format!(
                "x has {} values but y has {}",
                x.len(),
                y.len()
            )));
        }
        let pairs = x
            .into_iter()
            .zip(y)
            .map(|(x, y)| TrainingPair { x, y })
            .collect();
        Self::new(pairs)
    }

    /// Parse the `{"x": [..], "y": [..]}` JSON form
    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let columns: TrainingColumns = serde_json::from_str(json)?;
        Self::try_from(columns)
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TrainingPair> {
        self.pairs.get(index)
    }

    pub fn pairs(&self) -> &[TrainingPair] {
        &self.pairs
    }

    pub fn xs(&self) -> impl Iterator<Item = f64> + '_ {
        self.pairs.iter().map(|p| p.x)
    }
}

impl TryFrom<TrainingColumns> for TrainingSet {
    type Error = SessionError;

    fn try_from(columns: TrainingColumns) -> Result<Self, Self::Error> {
        Self::from_columns(columns.x, columns.y)
    }
}

impl From<TrainingSet> for TrainingColumns {
    fn from(set: TrainingSet) -> Self {
        let (x, y) = set.pairs.iter().map(|p| (p.x, p.y)).unzip();
        TrainingColumns { x, y }
    }
}

/// Shuffled `x` values presented during the testing phase, one per testing trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TestPlan(Vec<f64>);

impl TestPlan {
    pub fn new(xs: Vec<f64>) -> Self {
        Self(xs)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(index).copied()
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}

/// Training data together with the plan derived from it
#[derive(Debug, Clone, PartialEq)]
pub struct Stimuli {
    pub training: TrainingSet,
    pub test_plan: TestPlan,
}

/// Session phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for stimuli
    Idle,
    Training,
    Testing,
    /// All trials done; input is disabled
    Complete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Training => "training",
            Phase::Testing => "testing",
            Phase::Complete => "complete",
        }
    }
}

/// Per-trial correction progress during training
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrectionState {
    AwaitingFirstResponse,
    AwaitingCorrection,
}

/// The payload reported to the result sink: testing inputs and responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultPayload {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Everything known about a finished session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    /// First responses given on each training trial
    pub training_responses: Vec<f64>,
    /// The reported `{x, y}` payload
    pub result: ResultPayload,
}
