//! Persisted record types for the Flowgate registry store.

use serde::{Deserialize, Serialize};

use flowgate_core::{Did, ShardUrl, TenantId, Vid};

/// One registered engine shard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShardRecord {
    pub url: ShardUrl,
    /// Unix timestamp (seconds) of registration.
    pub registered_at: u64,
}

/// Pins one tenant to one shard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TenantAssignment {
    pub tenant: TenantId,
    pub shard_url: ShardUrl,
    /// Unix timestamp (seconds) of the assignment.
    pub assigned_at: u64,
}

/// Maps one vid to the engine deployment currently backing it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VidRelation {
    pub vid: Vid,
    pub did: Did,
}

/// A vid relation mid-removal: deleted from the relation tables,
/// parked here until the paired engine removal settles.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingRemoval {
    pub vid: Vid,
    pub did: Did,
    /// Unix timestamp (seconds) when the removal began.
    pub started_at: u64,
}
