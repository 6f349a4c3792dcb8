//! Session bootstrap
//!
//! Before the first trial a participant needs an identity on the experiment
//! server and a training set. The server hands these out through a three-step
//! handshake, modelled here as a sequential pipeline with named stages:
//!
//! 1. `CreateAgent` - register the participant and receive an agent id
//! 2. `PollTransmissions` - find the info transmitted to that agent
//! 3. `FetchInfo` - download the info whose contents are the training set
//!
//! followed by local `DecodeStimuli` and `PlanTests` stages. Each remote stage
//! is retried according to the configured [`RetryPolicy`]; the first stage that
//! exhausts its attempts ends the pipeline with a single error.

mod memory;

#[cfg(feature = "http")]
mod http;

pub use memory::InMemoryServer;

#[cfg(feature = "http")]
pub use http::HttpServer;

use std::fmt;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::{ExperimentConfig, RetryPolicy};
use crate::error::{BootstrapStage, SessionError};
use crate::render::TrialRenderer;
use crate::session::{ResultSink, Session};
use crate::stimulus::StimulusGenerator;
use crate::types::{SessionReport, Stimuli, TrainingSet};

/// Participant identity issued by the experiment server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A pending transmission addressed to an agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    pub info_uuid: String,
}

/// An info record; `contents` is an opaque JSON string
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Info {
    pub contents: String,
}

/// `POST /agents` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsResponse {
    pub agents: AgentRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRecord {
    pub uuid: String,
}

/// `GET /transmissions` response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionsResponse {
    #[serde(default)]
    pub transmissions: Vec<Transmission>,
}

/// Request/response contract with the experiment server
pub trait ExperimentServer {
    /// Register a new participant
    fn create_agent(&mut self) -> Result<AgentId, SessionError>;

    /// Transmissions waiting for `agent`, oldest first
    fn pending_transmissions(&mut self, agent: &AgentId) -> Result<Vec<Transmission>, SessionError>;

    /// Fetch one info record
    fn fetch_info(&mut self, info_uuid: &str) -> Result<Info, SessionError>;

    /// Store an info record created by `origin`
    fn post_info(&mut self, origin: &AgentId, contents: &str) -> Result<(), SessionError>;
}

impl<S: ExperimentServer + ?Sized> ExperimentServer for &mut S {
    fn create_agent(&mut self) -> Result<AgentId, SessionError> {
        (**self).create_agent()
    }

    fn pending_transmissions(
        &mut self,
        agent: &AgentId,
    ) -> Result<Vec<Transmission>, SessionError> {
        (**self).pending_transmissions(agent)
    }

    fn fetch_info(&mut self, info_uuid: &str) -> Result<Info, SessionError> {
        (**self).fetch_info(info_uuid)
    }

    fn post_info(&mut self, origin: &AgentId, contents: &str) -> Result<(), SessionError> {
        (**self).post_info(origin, contents)
    }
}

/// Output of a successful bootstrap
#[derive(Debug, Clone)]
pub struct Bootstrapped {
    pub agent: AgentId,
    pub stimuli: Stimuli,
}

/// Runs the bootstrap stages against a server
pub struct Bootstrap {
    config: ExperimentConfig,
}

impl Bootstrap {
    pub fn new(config: ExperimentConfig) -> Self {
        Self { config }
    }

    /// Run every stage in order, stopping at the first one that fails
    pub fn run<S: ExperimentServer + ?Sized>(
        &self,
        server: &mut S,
    ) -> Result<Bootstrapped, SessionError> {
        let policy = self.config.bootstrap;

        let agent = retry(policy, BootstrapStage::CreateAgent, || server.create_agent())?;
        info!(agent = %agent, "Agent created");

        let transmission = retry(policy, BootstrapStage::PollTransmissions, || {
            server
                .pending_transmissions(&agent)?
                .into_iter()
                .next()
                .ok_or_else(|| SessionError::Transport("no pending transmissions".to_string()))
        })?;

        let info = retry(policy, BootstrapStage::FetchInfo, || {
            server.fetch_info(&transmission.info_uuid)
        })?;

        let training = TrainingSet::from_json(&info.contents)
            .map_err(|e| SessionError::at_stage(BootstrapStage::DecodeStimuli, e))?;

        let stimuli = StimulusGenerator::generate(training, &self.config).map_err(|e| {
            error!(stage = %BootstrapStage::PlanTests, error = %e, "Cannot build test plan");
            e
        })?;

        info!(
            agent = %agent,
            training_trials = stimuli.training.len(),
            "Bootstrap complete"
        );
        Ok(Bootstrapped { agent, stimuli })
    }
}

fn retry<T>(
    policy: RetryPolicy,
    stage: BootstrapStage,
    mut op: impl FnMut() -> Result<T, SessionError>,
) -> Result<T, SessionError> {
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(%stage, attempt, error = %e, "Bootstrap stage failed, retrying");
                if policy.backoff_ms > 0 {
                    thread::sleep(Duration::from_millis(policy.backoff_ms));
                }
                attempt += 1;
            }
            Err(e) => {
                error!(%stage, attempt, error = %e, "Bootstrap stage failed");
                return Err(SessionError::at_stage(stage, e));
            }
        }
    }
}

impl<R: TrialRenderer, S: ResultSink> Session<R, S> {
    /// Run the bootstrap pipeline and inject its outcome as an ordinary event.
    ///
    /// On failure the session stays idle and the error is both returned and
    /// kept on the session.
    pub fn bootstrap_from<X: ExperimentServer + ?Sized>(
        &mut self,
        server: &mut X,
    ) -> Result<AgentId, SessionError> {
        let bootstrap = Bootstrap::new(self.machine().config().clone());
        match bootstrap.run(server) {
            Ok(Bootstrapped { agent, stimuli }) => {
                self.load(stimuli)?;
                Ok(agent)
            }
            Err(e) => {
                self.bootstrap_failed(stage_tagged(&e));
                Err(e)
            }
        }
    }
}

/// Copy of a pipeline error tagged with the stage that produced it
fn stage_tagged(err: &SessionError) -> SessionError {
    match err {
        SessionError::Bootstrap { stage, message } => SessionError::Bootstrap {
            stage: *stage,
            message: message.clone(),
        },
        other => SessionError::at_stage(BootstrapStage::PlanTests, other),
    }
}

/// Result sink that posts the `{x, y}` payload back to the server as a new info
pub struct ServerSink<S> {
    server: S,
    origin: AgentId,
}

impl<S: ExperimentServer> ServerSink<S> {
    pub fn new(server: S, origin: AgentId) -> Self {
        Self { server, origin }
    }
}

impl<S: ExperimentServer> ResultSink for ServerSink<S> {
    fn submit(&mut self, report: &SessionReport) -> Result<(), SessionError> {
        let contents = serde_json::to_string(&report.result)?;
        self.server
            .post_info(&self.origin, &contents)
            .map_err(|e| SessionError::Reporting(e.to_string()))
    }
}
