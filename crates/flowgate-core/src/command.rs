//! Inbound command envelope and its parsed form.
//!
//! Commands arrive as JSON from the event bus or the REST API:
//!
//! ```json
//! { "command": "PUT", "id": "42", "owner": "tenant-a",
//!   "deployment": { "name": "...", "diagram": { "xml_deployed": "...", "svg": "..." } } }
//! ```
//!
//! Unknown `command` values parse to [`DeploymentCommand::Ignored`];
//! they are logged and acknowledged, never retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{DeploymentPayload, TenantId, Vid};

/// Wire format of a deployment command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommandEnvelope {
    /// "PUT" or "DELETE". Anything else is ignored.
    pub command: String,
    /// The vid this command addresses.
    pub id: Vid,
    /// Owning tenant. Empty for administrative deletes that should
    /// search every shard.
    #[serde(default)]
    pub owner: TenantId,
    /// Deployment content, required for PUT.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<DeploymentPayload>,
    /// Optional source tag recorded on the engine deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Optional upstream schema version, informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

/// A command envelope resolved into the saga it drives.
#[derive(Debug, Clone, PartialEq)]
pub enum DeploymentCommand {
    /// Drive the create saga (possibly preceded by an implicit delete
    /// of the same vid).
    Create {
        vid: Vid,
        tenant: TenantId,
        payload: DeploymentPayload,
        source: Option<String>,
    },
    /// Drive the delete saga. `tenant` of `None` means the owner is
    /// unknown and every shard must be searched.
    Delete { vid: Vid, tenant: Option<TenantId> },
    /// Unknown command verb; acknowledged without effect.
    Ignored { command: String, vid: Vid },
}

/// Envelope that cannot be turned into a runnable command.
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    #[error("command {0:?} is missing the vid")]
    MissingVid(String),

    #[error("PUT command for vid {0} carries no deployment payload")]
    MissingPayload(Vid),

    #[error("PUT command for vid {0} carries no owner")]
    MissingOwner(Vid),
}

impl CommandEnvelope {
    /// Build a DELETE envelope, as emitted by the sweeper for an
    /// unlinked deployment (no owner: every shard is searched).
    pub fn synthetic_delete(id: impl Into<Vid>) -> Self {
        Self {
            command: "DELETE".to_string(),
            id: id.into(),
            owner: String::new(),
            deployment: None,
            source: None,
            version: None,
        }
    }

    /// Resolve the envelope into the saga it drives.
    pub fn into_command(self) -> Result<DeploymentCommand, CommandError> {
        if self.id.is_empty() {
            return Err(CommandError::MissingVid(self.command));
        }
        match self.command.as_str() {
            "PUT" => {
                let payload = self
                    .deployment
                    .ok_or_else(|| CommandError::MissingPayload(self.id.clone()))?;
                if self.owner.is_empty() {
                    return Err(CommandError::MissingOwner(self.id));
                }
                Ok(DeploymentCommand::Create {
                    vid: self.id,
                    tenant: self.owner,
                    payload,
                    source: self.source,
                })
            }
            "DELETE" => Ok(DeploymentCommand::Delete {
                vid: self.id,
                tenant: (!self.owner.is_empty()).then_some(self.owner),
            }),
            other => Ok(DeploymentCommand::Ignored {
                command: other.to_string(),
                vid: self.id,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DiagramPayload;

    fn put_envelope() -> CommandEnvelope {
        CommandEnvelope {
            command: "PUT".to_string(),
            id: "vid-1".to_string(),
            owner: "tenant-a".to_string(),
            deployment: Some(DeploymentPayload {
                id: "up-7".to_string(),
                name: "invoice".to_string(),
                diagram: DiagramPayload {
                    xml_deployed: "<definitions/>".to_string(),
                    svg: "<svg/>".to_string(),
                },
                incident_handling: None,
            }),
            source: Some("editor".to_string()),
            version: Some(2),
        }
    }

    #[test]
    fn put_parses_to_create() {
        let cmd = put_envelope().into_command().unwrap();
        match cmd {
            DeploymentCommand::Create {
                vid,
                tenant,
                payload,
                source,
            } => {
                assert_eq!(vid, "vid-1");
                assert_eq!(tenant, "tenant-a");
                assert_eq!(payload.name, "invoice");
                assert_eq!(source.as_deref(), Some("editor"));
            }
            other => panic!("expected Create, got {other:?}"),
        }
    }

    #[test]
    fn delete_with_owner_parses_to_scoped_delete() {
        let env = CommandEnvelope {
            command: "DELETE".to_string(),
            id: "vid-1".to_string(),
            owner: "tenant-a".to_string(),
            deployment: None,
            source: None,
            version: None,
        };
        assert_eq!(
            env.into_command().unwrap(),
            DeploymentCommand::Delete {
                vid: "vid-1".to_string(),
                tenant: Some("tenant-a".to_string()),
            }
        );
    }

    #[test]
    fn delete_without_owner_searches_all_shards() {
        let env = CommandEnvelope::synthetic_delete("orphan-did");
        assert_eq!(
            env.into_command().unwrap(),
            DeploymentCommand::Delete {
                vid: "orphan-did".to_string(),
                tenant: None,
            }
        );
    }

    #[test]
    fn unknown_command_is_ignored_not_an_error() {
        let env = CommandEnvelope {
            command: "PATCH".to_string(),
            id: "vid-1".to_string(),
            owner: String::new(),
            deployment: None,
            source: None,
            version: None,
        };
        assert_eq!(
            env.into_command().unwrap(),
            DeploymentCommand::Ignored {
                command: "PATCH".to_string(),
                vid: "vid-1".to_string(),
            }
        );
    }

    #[test]
    fn put_without_payload_is_rejected() {
        let mut env = put_envelope();
        env.deployment = None;
        assert_eq!(
            env.into_command().unwrap_err(),
            CommandError::MissingPayload("vid-1".to_string())
        );
    }

    #[test]
    fn put_without_owner_is_rejected() {
        let mut env = put_envelope();
        env.owner = String::new();
        assert_eq!(
            env.into_command().unwrap_err(),
            CommandError::MissingOwner("vid-1".to_string())
        );
    }

    #[test]
    fn empty_vid_is_rejected() {
        let mut env = put_envelope();
        env.id = String::new();
        assert!(matches!(
            env.into_command().unwrap_err(),
            CommandError::MissingVid(_)
        ));
    }

    #[test]
    fn envelope_round_trips_through_json() {
        let env = put_envelope();
        let json = serde_json::to_string(&env).unwrap();
        let back: CommandEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(back, env);
    }

    #[test]
    fn envelope_parses_wire_format() {
        let json = r#"{
            "command": "PUT",
            "id": "1",
            "owner": "n11",
            "deployment": {
                "id": "d1",
                "name": "order",
                "diagram": { "xml_deployed": "<definitions/>", "svg": "<svg/>" }
            },
            "source": "importer",
            "version": 1
        }"#;
        let env: CommandEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.command, "PUT");
        assert_eq!(env.owner, "n11");
        assert!(env.deployment.unwrap().incident_handling.is_none());
    }
}
