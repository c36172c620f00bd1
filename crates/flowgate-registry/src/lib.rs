//! flowgate-registry — the two coordination registries.
//!
//! [`ShardRegistry`] owns tenant→shard assignment and least-load
//! selection, with a read cache over the store. [`VidRegistry`] owns
//! the vid↔did translation and the two-phase removal primitive the
//! delete saga compensates with. Correctness always comes from the
//! store's transactions; the caches are read accelerators only.

pub mod error;
pub mod shard;
pub mod vid;

pub use error::{RegistryError, RegistryResult};
pub use shard::ShardRegistry;
pub use vid::{VidRegistry, VidRemoval};
