//! Wire types of the engine REST surface.

use serde::{Deserialize, Serialize};

use flowgate_core::{Vid, VidAddressed};

/// One deployment as reported by an engine shard.
///
/// `id` is the shard-local did until the vid registry rewrites it via
/// [`VidAddressed`] on the way out of the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Unix timestamp (seconds) the engine recorded for the deployment.
    #[serde(default)]
    pub deployment_time: u64,
}

impl VidAddressed for DeploymentInfo {
    fn deployment_id(&self) -> &str {
        &self.id
    }

    fn set_public_id(&mut self, vid: Vid) {
        self.id = vid;
    }
}

/// One process definition produced by a deployment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessDefinition {
    pub id: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub deployment_id: String,
}

/// Body of the count endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountResult {
    pub count: u64,
}

/// Body of the definition-xml endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefinitionXml {
    pub id: String,
    pub xml: String,
}
