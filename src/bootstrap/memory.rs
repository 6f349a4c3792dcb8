//! In-process experiment server
//!
//! Serves a single training set to every agent and records posted infos.
//! Stages can be told to fail a number of times to exercise retry handling.

use std::collections::HashMap;

use uuid::Uuid;

use super::{AgentId, ExperimentServer, Info, Transmission};
use crate::error::{BootstrapStage, SessionError};
use crate::types::TrainingSet;

#[derive(Debug, Clone)]
pub struct InMemoryServer {
    contents: String,
    info_uuid: String,
    agents: Vec<AgentId>,
    posted: Vec<(AgentId, String)>,
    failures: HashMap<BootstrapStage, u32>,
    reject_posts: bool,
}

impl InMemoryServer {
    /// Serve a training set
    pub fn new(training: &TrainingSet) -> Result<Self, SessionError> {
        Ok(Self::from_contents(&serde_json::to_string(training)?))
    }

    /// Serve raw info contents, which need not be valid
    pub fn from_contents(contents: &str) -> Self {
        Self {
            contents: contents.to_string(),
            info_uuid: Uuid::new_v4().to_string(),
            agents: Vec::new(),
            posted: Vec::new(),
            failures: HashMap::new(),
            reject_posts: false,
        }
    }

    /// Make `stage` fail its next `times` requests
    pub fn failing(mut self, stage: BootstrapStage, times: u32) -> Self {
        self.failures.insert(stage, times);
        self
    }

    /// Make every `post_info` fail
    pub fn rejecting_posts(mut self) -> Self {
        self.reject_posts = true;
        self
    }

    pub fn agents(&self) -> &[AgentId] {
        &self.agents
    }

    /// Infos posted so far as `(origin, contents)`
    pub fn posted(&self) -> &[(AgentId, String)] {
        &self.posted
    }

    fn check(&mut self, stage: BootstrapStage) -> Result<(), SessionError> {
        match self.failures.get_mut(&stage) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(SessionError::Transport(format!("{stage} unavailable")))
            }
            _ => Ok(()),
        }
    }
}

impl ExperimentServer for InMemoryServer {
    fn create_agent(&mut self) -> Result<AgentId, SessionError> {
        self.check(BootstrapStage::CreateAgent)?;
        let agent = AgentId(Uuid::new_v4().to_string());
        self.agents.push(agent.clone());
        Ok(agent)
    }

    fn pending_transmissions(
        &mut self,
        agent: &AgentId,
    ) -> Result<Vec<Transmission>, SessionError> {
        self.check(BootstrapStage::PollTransmissions)?;
        if !self.agents.contains(agent) {
            return Err(SessionError::Transport(format!("unknown agent {agent}")));
        }
        Ok(vec![Transmission {
            info_uuid: self.info_uuid.clone(),
        }])
    }

    fn fetch_info(&mut self, info_uuid: &str) -> Result<Info, SessionError> {
        self.check(BootstrapStage::FetchInfo)?;
        if info_uuid != self.info_uuid {
            return Err(SessionError::Transport(format!("unknown info {info_uuid}")));
        }
        Ok(Info {
            contents: self.contents.clone(),
        })
    }

    fn post_info(&mut self, origin: &AgentId, contents: &str) -> Result<(), SessionError> {
        if self.reject_posts {
            return Err(SessionError::Transport("information endpoint unavailable".to_string()));
        }
        self.posted.push((origin.clone(), contents.to_string()));
        Ok(())
    }
}
