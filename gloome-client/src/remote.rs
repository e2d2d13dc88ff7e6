//! Remote analysis service client

use async_trait::async_trait;
use gloome_common::protocol::{ExampleResponse, JobKind, PollResponse, ProcessId, SubmitAck};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::error::ClientError;

const USER_AGENT: &str = concat!("gloome-client/", env!("CARGO_PKG_VERSION"));

/// The three operations the client needs from the service
#[async_trait]
pub trait RemoteService: Send + Sync {
    async fn submit_job(&self, kind: JobKind, parameters: &[(String, String)]) -> Result<SubmitAck, ClientError>;

    async fn poll_job(&self, process_id: &ProcessId) -> Result<PollResponse, ClientError>;

    async fn fetch_example(&self, mode: u8) -> Result<ExampleResponse, ClientError>;
}

/// HTTP implementation
pub struct HttpRemote {
    http_client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::NetworkError(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(ClientError::ApiError(status.as_u16(), error_text));
        }
        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(e.to_string()))
    }
}

#[async_trait]
impl RemoteService for HttpRemote {
    async fn submit_job(&self, kind: JobKind, parameters: &[(String, String)]) -> Result<SubmitAck, ClientError> {
        let url = self.url(kind.route());
        debug!(url = %url, kind = %kind, fields = parameters.len(), "Submitting job");

        let response = self.http_client.post(&url).form(parameters).send().await?;
        let status = response.status();
        if status.is_success() {
            return Self::read_json(response).await;
        }

        // Rejections may come back as an error status with a JSON body
        let body = response.text().await.unwrap_or_default();
        match serde_json::from_str::<SubmitAck>(&body) {
            Ok(ack) if !ack.success => Ok(ack),
            _ => Err(ClientError::ApiError(status.as_u16(), body)),
        }
    }

    async fn poll_job(&self, process_id: &ProcessId) -> Result<PollResponse, ClientError> {
        let url = self.url(&format!("job_status/{}", process_id));
        debug!(url = %url, "Polling job status");
        let response = self.http_client.get(&url).send().await?;
        Self::read_json(response).await
    }

    async fn fetch_example(&self, mode: u8) -> Result<ExampleResponse, ClientError> {
        let url = self.url("get_exemple");
        let response = self
            .http_client
            .get(&url)
            .query(&[("mode", mode)])
            .send()
            .await?;
        Self::read_json(response).await
    }
}
