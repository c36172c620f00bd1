//! redb table definitions for the Flowgate registry store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized
//! records). `vid_relations` and `vids_by_did` are two halves of one
//! bidirectional mapping and are only ever written together inside a
//! single write transaction.

use redb::TableDefinition;

/// Registered engine shards keyed by shard URL.
pub const SHARDS: TableDefinition<&str, &[u8]> = TableDefinition::new("shards");

/// Tenant assignments keyed by tenant id. At most one row per tenant.
pub const TENANT_SHARDS: TableDefinition<&str, &[u8]> = TableDefinition::new("tenant_shards");

/// Vid relations keyed by vid.
pub const VID_RELATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("vid_relations");

/// Reverse index keyed by engine deployment id, value is the vid.
pub const VIDS_BY_DID: TableDefinition<&str, &[u8]> = TableDefinition::new("vids_by_did");

/// Vid removals that have begun but are neither committed nor rolled
/// back, keyed by vid.
pub const PENDING_REMOVALS: TableDefinition<&str, &[u8]> = TableDefinition::new("pending_removals");
