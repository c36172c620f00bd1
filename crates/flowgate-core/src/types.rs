//! Domain types shared across the Flowgate control plane.
//!
//! The two identifier families are kept strictly apart in naming:
//! a [`Vid`] is the stable, externally-visible deployment identifier,
//! a [`Did`] is the identifier an engine shard assigned locally. The
//! vid registry is the only component allowed to translate between
//! the two.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Externally-visible, shard-independent deployment identifier.
pub type Vid = String;

/// Shard-local deployment identifier assigned by the engine.
pub type Did = String;

/// Tenant identifier. Each tenant is pinned to exactly one shard.
pub type TenantId = String;

/// Base URL of one engine shard (unique, primary key of the shard set).
pub type ShardUrl = String;

/// Current Unix timestamp in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

// ── Deployment payload ─────────────────────────────────────────────

/// Deployment content carried by a PUT command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeploymentPayload {
    /// Upstream identifier of the payload, informational only.
    #[serde(default)]
    pub id: String,
    /// Display name of the deployment.
    pub name: String,
    /// Diagram content to deploy.
    pub diagram: DiagramPayload,
    /// Incident-handling policy to register for the resulting
    /// process definitions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub incident_handling: Option<IncidentPolicy>,
}

/// BPMN diagram plus its SVG rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiagramPayload {
    /// The BPMN XML to deploy.
    #[serde(default)]
    pub xml_deployed: String,
    /// SVG rendering of the diagram.
    #[serde(default)]
    pub svg: String,
}

/// Incident-handling policy attached to the process definitions of a
/// deployment. Interpreted by the external incident service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IncidentPolicy {
    /// Name of the incident handler to invoke.
    pub handler: String,
    /// Retry budget before the handler escalates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

// ── Identifier translation ─────────────────────────────────────────

/// An engine-facing result object whose identifier field can be
/// rewritten from the shard-local did to the externally-stable vid
/// before it leaves the control plane.
pub trait VidAddressed {
    /// The engine deployment id this object currently carries.
    fn deployment_id(&self) -> &str;
    /// Replace the identifier with the externally-visible vid.
    fn set_public_id(&mut self, vid: Vid);
}

// ── Drift ──────────────────────────────────────────────────────────

/// Divergence between the registries and actual engine state, found
/// by a reconciliation sweep. Never persisted.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum DriftRecord {
    /// A vid whose did no longer exists on any shard.
    UnlinkedVid { vid: Vid, did: Did },
    /// An engine deployment with no vid, older than the age buffer.
    UnlinkedDeployment {
        shard: ShardUrl,
        did: Did,
        age_secs: u64,
    },
    /// A vid removal that was started but neither committed nor
    /// rolled back (crash in the removal window).
    StalePendingRemoval { vid: Vid, did: Did, age_secs: u64 },
}
