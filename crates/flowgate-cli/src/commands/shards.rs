//! Shard management commands.

use anyhow::Context as _;

use super::{confirm, Context};

pub async fn add(ctx: &Context, url: &str) -> anyhow::Result<()> {
    // Refuse to register a shard the engine client cannot reach;
    // tenants would otherwise be assigned to a black hole.
    ctx.engines
        .client(url)
        .ping()
        .await
        .with_context(|| format!("engine at {url} is not reachable"))?;
    ctx.shards.ensure_shard(url).await?;
    println!("shard registered: {url}");
    Ok(())
}

pub async fn remove(ctx: &Context, url: &str, yes: bool) -> anyhow::Result<()> {
    let prompt = format!("Remove shard {url} and clear its tenant assignments?");
    if !confirm(&prompt, yes)? {
        println!("aborted");
        return Ok(());
    }
    let cleared = ctx.shards.remove_shard(url).await?;
    println!("shard removed: {url} ({cleared} tenant assignments cleared)");
    Ok(())
}

pub async fn list(ctx: &Context) -> anyhow::Result<()> {
    let counts = ctx.shards.shard_tenant_counts().await?;
    if counts.is_empty() {
        println!("no shards registered");
        return Ok(());
    }
    println!("{:<48} {:>8}", "SHARD", "TENANTS");
    for (url, count) in counts {
        println!("{url:<48} {count:>8}");
    }
    Ok(())
}
