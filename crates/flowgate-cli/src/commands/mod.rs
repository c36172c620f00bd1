//! flowctl command implementations.

pub mod drift;
pub mod migrate;
pub mod shards;

use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use flowgate_engine::EngineClientPool;
use flowgate_registry::{ShardRegistry, VidRegistry};
use flowgate_state::RegistryStore;

/// Shared handles for every command, built once from the data dir.
pub struct Context {
    pub shards: ShardRegistry,
    pub vids: VidRegistry,
    pub engines: EngineClientPool,
}

impl Context {
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let store = RegistryStore::open(&data_dir.join("flowgate.redb"))?;
        Ok(Self {
            shards: ShardRegistry::new(store.clone()),
            vids: VidRegistry::new(store),
            engines: EngineClientPool::new(Duration::from_secs(30))?,
        })
    }
}

/// Ask for confirmation unless `--yes` was passed. Destructive
/// commands go through here.
pub fn confirm(prompt: &str, yes: bool) -> anyhow::Result<bool> {
    if yes {
        return Ok(true);
    }
    print!("{prompt} [y/N]: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(matches!(line.trim(), "y" | "Y" | "yes"))
}
