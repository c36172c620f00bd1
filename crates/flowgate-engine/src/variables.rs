//! Process-IO variable service client.
//!
//! Holds input/output variable records keyed by process definition
//! ids. Cleanup must happen while the definition ids are still
//! resolvable, so the delete saga calls this before the vid mapping
//! and the engine deployment go away.

use reqwest::StatusCode;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

#[derive(Clone)]
pub struct VariablesClient {
    http: reqwest::Client,
    base: String,
}

impl VariablesClient {
    pub fn new(http: reqwest::Client, base: &str) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
        }
    }

    /// Delete all process-IO variables for one process definition.
    /// Already-absent records are success.
    pub async fn remove_for_definition(&self, definition_id: &str) -> EngineResult<()> {
        let url = format!("{}/process-io/by-definition/{}", self.base, definition_id);
        let response = self.http.delete(&url).send().await?;
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(%definition_id, "no variable records to delete");
            return Ok(());
        }
        if !status.is_success() {
            return Err(EngineError::Status {
                status: status.as_u16(),
                url,
                body: response.text().await.unwrap_or_default(),
            });
        }
        debug!(%definition_id, "variable records deleted");
        Ok(())
    }
}
