//! Incident service client.
//!
//! The incident subsystem is a separate collaborator keyed by process
//! definition ids. Deleting records for a definition that has none is
//! success, so repeated delete sagas stay idempotent.

use reqwest::StatusCode;
use tracing::debug;

use flowgate_core::IncidentPolicy;

use crate::error::{EngineError, EngineResult};

#[derive(Clone)]
pub struct IncidentClient {
    http: reqwest::Client,
    base: String,
}

impl IncidentClient {
    pub fn new(http: reqwest::Client, base: &str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Register an incident-handling policy for one process definition.
    pub async fn set_policy(
        &self,
        definition_id: &str,
        policy: &IncidentPolicy,
    ) -> EngineResult<()> {
        let url = format!("{}/incident-policies", self.base);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "definition_id": definition_id,
                "policy": policy,
            }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Status {
                status: status.as_u16(),
                url,
                body: response.text().await.unwrap_or_default(),
            });
        }
        debug!(%definition_id, handler = %policy.handler, "incident policy registered");
        Ok(())
    }

    /// Delete all incident records for one process definition.
    /// Already-absent records are success.
    pub async fn remove_for_definition(&self, definition_id: &str) -> EngineResult<()> {
        let url = format!("{}/incident-policies/by-definition/{}", self.base, definition_id);
        let response = self.http.delete(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(%definition_id, "no incident records to delete");
            return Ok(());
        }
        if !status.is_success() {
            return Err(EngineError::Status {
                status: status.as_u16(),
                url,
                body: response.text().await.unwrap_or_default(),
            });
        }
        debug!(%definition_id, "incident records deleted");
        Ok(())
    }
}
