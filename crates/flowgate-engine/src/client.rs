//! Engine shard client.
//!
//! One [`EngineClient`] per shard URL, all sharing one pooled
//! `reqwest::Client` via [`EngineClientPool`]. Deployment deletion is
//! cascading on the engine side; deleting a deployment that is
//! already gone reports success (the saga treats already-gone as
//! done, not as an error).

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::types::{CountResult, DefinitionXml, DeploymentInfo, ProcessDefinition};

/// Shared HTTP connection pool handed to every per-shard client.
#[derive(Clone)]
pub struct EngineClientPool {
    http: reqwest::Client,
}

impl EngineClientPool {
    pub fn new(request_timeout: Duration) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self { http })
    }

    /// Client for one shard.
    pub fn client(&self, shard_url: &str) -> EngineClient {
        EngineClient::new(self.http.clone(), shard_url)
    }

    /// The underlying pooled HTTP client, for the auxiliary services.
    pub fn http(&self) -> reqwest::Client {
        self.http.clone()
    }
}

/// Fields of a deployment-create call.
#[derive(Debug, Clone, Copy)]
pub struct CreateDeployment<'a> {
    pub name: &'a str,
    pub source: Option<&'a str>,
    pub tenant: &'a str,
    pub xml: &'a str,
    pub svg: &'a str,
}

/// REST client for a single engine shard.
#[derive(Clone)]
pub struct EngineClient {
    http: reqwest::Client,
    base: String,
}

impl EngineClient {
    pub fn new(http: reqwest::Client, base: &str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// The shard URL this client talks to.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Availability probe: any well-formed answer from the count
    /// endpoint means the shard is reachable and speaks the protocol.
    pub async fn ping(&self) -> EngineResult<()> {
        self.count_deployments(None).await.map(|_| ())
    }

    /// Deploy a document. The multipart form carries the BPMN XML and
    /// the SVG rendering alongside name, source tag, and tenant id.
    ///
    /// A 4xx answer is the engine refusing the document content and
    /// surfaces as [`EngineError::Rejected`]; transport failures and
    /// 5xx answers surface separately so the caller can tell the two
    /// apart.
    pub async fn create_deployment(
        &self,
        req: CreateDeployment<'_>,
    ) -> EngineResult<DeploymentInfo> {
        let url = format!("{}/deployment/create", self.base);
        let mut form = Form::new()
            .text("deployment-name", req.name.to_string())
            .text("tenant-id", req.tenant.to_string())
            .part(
                "data",
                Part::text(req.xml.to_string())
                    .file_name("diagram.bpmn")
                    .mime_str("application/xml")?,
            )
            .part(
                "diagram",
                Part::text(req.svg.to_string())
                    .file_name("diagram.svg")
                    .mime_str("image/svg+xml")?,
            );
        if let Some(source) = req.source {
            form = form.text("deployment-source", source.to_string());
        }

        let response = self.http.post(&url).multipart(form).send().await?;
        let status = response.status();
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        if !status.is_success() {
            return Err(status_error(status, &url, response).await);
        }
        let info: DeploymentInfo = decode(response).await?;
        debug!(shard = %self.base, did = %info.id, name = %req.name, "deployment created");
        Ok(info)
    }

    /// Delete a deployment with cascade. 404 means it was already
    /// gone, which is success.
    pub async fn delete_deployment(&self, did: &str) -> EngineResult<()> {
        let url = format!("{}/deployment/{}?cascade=true", self.base, did);
        let response = self.http.delete(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(shard = %self.base, %did, "deployment already gone");
            return Ok(());
        }
        if !status.is_success() {
            return Err(status_error(status, &url, response).await);
        }
        debug!(shard = %self.base, %did, "deployment deleted");
        Ok(())
    }

    /// Count deployments, optionally restricted to one did.
    pub async fn count_deployments(&self, did: Option<&str>) -> EngineResult<u64> {
        let url = format!("{}/deployment/count", self.base);
        let mut request = self.http.get(&url);
        if let Some(did) = did {
            request = request.query(&[("id", did)]);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &url, response).await);
        }
        let result: CountResult = decode(response).await?;
        Ok(result.count)
    }

    /// List deployments, optionally restricted to one tenant.
    pub async fn list_deployments(
        &self,
        tenant: Option<&str>,
    ) -> EngineResult<Vec<DeploymentInfo>> {
        let url = format!("{}/deployment", self.base);
        let mut request = self.http.get(&url);
        if let Some(tenant) = tenant {
            request = request.query(&[("tenantIdIn", tenant)]);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &url, response).await);
        }
        decode(response).await
    }

    /// Paged deployment scan for migration tooling.
    pub async fn list_deployments_paged(
        &self,
        first_result: usize,
        max_results: usize,
    ) -> EngineResult<Vec<DeploymentInfo>> {
        let url = format!("{}/deployment", self.base);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("firstResult", first_result.to_string()),
                ("maxResults", max_results.to_string()),
            ])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &url, response).await);
        }
        decode(response).await
    }

    /// Process definitions produced by one deployment.
    pub async fn process_definitions(&self, did: &str) -> EngineResult<Vec<ProcessDefinition>> {
        let url = format!("{}/process-definition", self.base);
        let response = self
            .http
            .get(&url)
            .query(&[("deploymentId", did)])
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &url, response).await);
        }
        decode(response).await
    }

    /// The deployed BPMN XML of one process definition.
    pub async fn definition_xml(&self, definition_id: &str) -> EngineResult<String> {
        let url = format!("{}/process-definition/{}/xml", self.base, definition_id);
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &url, response).await);
        }
        let result: DefinitionXml = decode(response).await?;
        Ok(result.xml)
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> EngineResult<T> {
    Ok(response.json::<T>().await?)
}

async fn status_error(
    status: StatusCode,
    url: &str,
    response: reqwest::Response,
) -> EngineError {
    EngineError::Status {
        status: status.as_u16(),
        url: url.to_string(),
        body: response.text().await.unwrap_or_default(),
    }
}
