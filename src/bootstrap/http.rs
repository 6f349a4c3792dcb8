//! HTTP transport for the experiment server

use std::time::Duration;

use reqwest::blocking::Client;

use super::{AgentId, AgentsResponse, ExperimentServer, Info, Transmission, TransmissionsResponse};
use crate::error::SessionError;

/// Blocking client for the experiment server's REST routes
pub struct HttpServer {
    base_url: String,
    client: Client,
}

impl HttpServer {
    pub fn new(base_url: &str) -> Result<Self, SessionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(transport)?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn transport(err: reqwest::Error) -> SessionError {
    SessionError::Transport(err.to_string())
}

impl ExperimentServer for HttpServer {
    fn create_agent(&mut self) -> Result<AgentId, SessionError> {
        let resp: AgentsResponse = self
            .client
            .post(self.url("/agents"))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(transport)?;
        Ok(AgentId(resp.agents.uuid))
    }

    fn pending_transmissions(
        &mut self,
        agent: &AgentId,
    ) -> Result<Vec<Transmission>, SessionError> {
        let resp: TransmissionsResponse = self
            .client
            .get(self.url("/transmissions"))
            .query(&[("destination_uuid", agent.as_str())])
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(transport)?;
        Ok(resp.transmissions)
    }

    fn fetch_info(&mut self, info_uuid: &str) -> Result<Info, SessionError> {
        self.client
            .get(self.url(&format!("/information/{info_uuid}")))
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(transport)
    }

    fn post_info(&mut self, origin: &AgentId, contents: &str) -> Result<(), SessionError> {
        self.client
            .post(self.url("/information"))
            .query(&[("origin_uuid", origin.as_str()), ("contents", contents)])
            .send()
            .and_then(|r| r.error_for_status())
            .map(|_| ())
            .map_err(transport)
    }
}
