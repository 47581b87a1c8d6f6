//! HTTP client for the node-local network manager daemon.

use async_trait::async_trait;
use serde::Serialize;
use stevedore_common::error::{Result, StevedoreError};

use crate::NetworkManager;

/// Body of an attach request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachRequest<'a> {
    container_id: String,
    pid: u32,
    service_name: &'a str,
    instance_number: u32,
    port_mappings: &'a str,
}

/// Body of a detach request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetachRequest<'a> {
    service_name: &'a str,
    instance_number: u32,
}

/// Talks to the network manager over its local REST API.
#[derive(Debug, Clone)]
pub struct HttpNetManager {
    base_url: String,
    client: reqwest::Client,
}

impl HttpNetManager {
    /// Creates a client for the network manager at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Returns the configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<()> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| StevedoreError::Network {
                message: format!("{url}: {e}"),
            })?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(StevedoreError::Network {
                message: format!("{url} answered {status}: {text}"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkManager for HttpNetManager {
    async fn attach(&self, pid: u32, service_name: &str, instance: u32, ports: &str) -> Result<()> {
        tracing::info!(pid, service = service_name, instance, "attaching overlay network");
        let body = AttachRequest {
            container_id: stevedore_common::types::TaskId::encode(service_name, instance)
                .to_string(),
            pid,
            service_name,
            instance_number: instance,
            port_mappings: ports,
        };
        self.post("/container/deploy", &body).await
    }

    async fn detach(&self, service_name: &str, instance: u32) -> Result<()> {
        tracing::info!(service = service_name, instance, "detaching overlay network");
        let body = DetachRequest {
            service_name,
            instance_number: instance,
        };
        self.post("/container/undeploy", &body).await
    }
}
