// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use codeswarm_core::domain::protocol::NodeTarget;
use codeswarm_swarm::domain::SwarmRecord;
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::types::{CommandAccepted, HealthReport, InjectRequest, LaunchRequest};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid backend url '{0}'")]
    InvalidUrl(String),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Api { status: u16, message: String },
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Api { status, .. } => Some(*status),
            ClientError::Http(e) => e.status().map(|s| s.as_u16()),
            ClientError::InvalidUrl(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status() == Some(409)
    }
}

/// HTTP client for the codeswarm backend.
#[derive(Debug, Clone)]
pub struct CodeswarmClient {
    base_url: Url,
    client: Client,
}

impl CodeswarmClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let base_url = Url::parse(base_url).map_err(|_| ClientError::InvalidUrl(base_url.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(ClientError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self {
            base_url,
            client: Client::new(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Websocket endpoint for the live event feed.
    pub fn ws_url(&self) -> Result<Url, ClientError> {
        let mut url = self.url(&["ws"])?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::InvalidUrl(url.to_string()))?;
        Ok(url)
    }

    pub async fn health(&self) -> Result<HealthReport, ClientError> {
        let response = self.client.get(self.url(&["health"])?).send().await?;
        decode(response).await
    }

    pub async fn list_swarms(&self) -> Result<Vec<SwarmRecord>, ClientError> {
        let response = self.client.get(self.url(&["swarms"])?).send().await?;
        decode(response).await
    }

    pub async fn get_swarm(&self, alias: &str) -> Result<SwarmRecord, ClientError> {
        let response = self.client.get(self.url(&["swarms", alias])?).send().await?;
        decode(response).await
    }

    /// Ask the backend to launch a swarm. The returned request id is the one
    /// the eventual `swarm_launched` or `command_rejected` will carry.
    pub async fn launch(&self, request: &LaunchRequest) -> Result<CommandAccepted, ClientError> {
        let response = self
            .client
            .post(self.url(&["launch"])?)
            .json(request)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn inject(
        &self,
        alias: &str,
        prompt: &str,
        nodes: NodeTarget,
    ) -> Result<CommandAccepted, ClientError> {
        let body = InjectRequest {
            prompt: prompt.to_string(),
            nodes,
        };
        let response = self
            .client
            .post(self.url(&["inject", alias])?)
            .json(&body)
            .send()
            .await?;
        decode(response).await
    }

    pub async fn terminate(&self, alias: &str) -> Result<CommandAccepted, ClientError> {
        let response = self
            .client
            .post(self.url(&["terminate", alias])?)
            .send()
            .await?;
        decode(response).await
    }

    fn url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json().await?);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| {
            if body.is_empty() {
                status.to_string()
            } else {
                body
            }
        });
    Err(ClientError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_escape_aliases() {
        let client = CodeswarmClient::new("http://localhost:4000/").unwrap();
        let url = client.url(&["swarms", "my swarm"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:4000/swarms/my%20swarm");
    }

    #[test]
    fn test_ws_url_scheme() {
        let plain = CodeswarmClient::new("http://localhost:4000").unwrap();
        assert_eq!(plain.ws_url().unwrap().as_str(), "ws://localhost:4000/ws");

        let tls = CodeswarmClient::new("https://example.org/api").unwrap();
        assert_eq!(tls.ws_url().unwrap().as_str(), "wss://example.org/api/ws");
    }

    #[test]
    fn test_rejects_bad_base_url() {
        assert!(matches!(
            CodeswarmClient::new("not a url"),
            Err(ClientError::InvalidUrl(_))
        ));
    }
}
