//! Request/response commands against the vehicle's HTTP API.

use gcs_mission::MissionPayload;
use gcs_proto::{Capabilities, CapabilitiesError, DemEntry, MissionAck, ModuleToggle, RemoteIdReport};
use gcs_vehicle::EmergencyPermit;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

use crate::Endpoint;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("http client setup failed: {0}")]
    Client(#[source] reqwest::Error),
    #[error("{op} failed: {source}")]
    Request {
        op: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{op} rejected with HTTP {status}")]
    Status { op: &'static str, status: StatusCode },
    #[error("{op} returned an unusable body: {reason}")]
    Body { op: &'static str, reason: String },
    #[error(transparent)]
    Capabilities(#[from] CapabilitiesError),
}

/// One-shot commands. Nothing is retried; the caller decides what to surface.
#[derive(Debug, Clone)]
pub struct CommandClient {
    http: Client,
    endpoint: Endpoint,
}

impl CommandClient {
    pub fn new(endpoint: Endpoint) -> Result<Self, CommandError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(CommandError::Client)?;
        Ok(Self { http, endpoint })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn set_endpoint(&mut self, endpoint: Endpoint) {
        self.endpoint = endpoint;
    }

    pub async fn capabilities(&self) -> Result<Capabilities, CommandError> {
        let op = "capabilities";
        let body = self.get_text(op, "capabilities").await?;
        Ok(Capabilities::from_response(&body)?)
    }

    pub async fn run_mission(&self, payload: &MissionPayload) -> Result<MissionAck, CommandError> {
        let op = "run_mission";
        info!("http: run_mission type={}", payload.mission_type);
        let resp = self.post_json(op, "run_mission", payload).await?;
        let body = resp.text().await.map_err(|source| CommandError::Request { op, source })?;
        Ok(parse_ack(&body))
    }

    pub async fn set_module_active(&self, module_name: &str, active: bool) -> Result<(), CommandError> {
        let toggle = ModuleToggle { module_name: module_name.to_string(), active };
        self.post_json("set_module_active", "set_module_active", &toggle).await?;
        Ok(())
    }

    pub async fn dems(&self) -> Result<Vec<DemEntry>, CommandError> {
        let op = "dems";
        let body = self.get_text(op, "dems").await?;
        serde_json::from_str(&body).map_err(|e| CommandError::Body { op, reason: e.to_string() })
    }

    pub async fn remote_id(&self, report: &RemoteIdReport) -> Result<(), CommandError> {
        self.post_json("remote_id", "remote_id", report).await?;
        Ok(())
    }

    /// Consumes the permit; a refused or failed send needs a fresh one.
    pub async fn emergency(&self, permit: EmergencyPermit) -> Result<(), CommandError> {
        let path = permit.action().path();
        let op = "emergency";
        info!("http: {}", path);
        let resp = self
            .http
            .post(self.endpoint.http_url(path))
            .send()
            .await
            .map_err(|source| CommandError::Request { op, source })?;
        check(op, resp)?;
        Ok(())
    }

    async fn get_text(&self, op: &'static str, path: &str) -> Result<String, CommandError> {
        let url = self.endpoint.http_url(path);
        debug!("http: GET {}", url);
        let resp = self.http.get(url).send().await.map_err(|source| CommandError::Request { op, source })?;
        check(op, resp)?.text().await.map_err(|source| CommandError::Request { op, source })
    }

    async fn post_json<T: Serialize + ?Sized>(
        &self,
        op: &'static str,
        path: &str,
        body: &T,
    ) -> Result<Response, CommandError> {
        let url = self.endpoint.http_url(path);
        debug!("http: POST {}", url);
        let resp = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|source| CommandError::Request { op, source })?;
        check(op, resp)
    }
}

fn check(op: &'static str, resp: Response) -> Result<Response, CommandError> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(CommandError::Status { op, status })
    }
}

/// The confirmation body is optional; anything that is not `{status}` counts
/// as a bare acceptance.
fn parse_ack(body: &str) -> MissionAck {
    serde_json::from_str(body).unwrap_or_default()
}
