//! Drift inspection and repair commands.

use std::time::Duration;

use anyhow::bail;

use flowgate_core::config::parse_duration;
use flowgate_core::DriftRecord;
use flowgate_sweep::Sweeper;

use super::{confirm, Context};

fn sweeper(ctx: &Context, age_buffer: Duration) -> Sweeper {
    Sweeper::new(
        ctx.shards.clone(),
        ctx.vids.clone(),
        ctx.engines.clone(),
        age_buffer,
    )
}

fn parse_buffer(raw: &str) -> anyhow::Result<Duration> {
    match parse_duration(raw) {
        Some(duration) => Ok(duration),
        None => bail!("cannot parse age buffer {raw:?} (expected e.g. \"6h\", \"30m\")"),
    }
}

pub async fn vids_list(ctx: &Context) -> anyhow::Result<()> {
    let drift = sweeper(ctx, Duration::ZERO).scan_unlinked_vids().await?;
    if drift.is_empty() {
        println!("no unlinked vids");
        return Ok(());
    }
    println!("{:<32} {:<32}", "VID", "MISSING DEPLOYMENT");
    for record in drift {
        if let DriftRecord::UnlinkedVid { vid, did } = record {
            println!("{vid:<32} {did:<32}");
        }
    }
    Ok(())
}

pub async fn vids_remove(ctx: &Context, yes: bool) -> anyhow::Result<()> {
    let sweeper = sweeper(ctx, Duration::ZERO);
    let drift = sweeper.scan_unlinked_vids().await?;
    if drift.is_empty() {
        println!("no unlinked vids");
        return Ok(());
    }
    let prompt = format!("Remove {} unlinked vid(s) from the registry?", drift.len());
    if !confirm(&prompt, yes)? {
        println!("aborted");
        return Ok(());
    }
    let removed = sweeper.remove_unlinked_vids().await?;
    println!("{removed} unlinked vid(s) removed");
    Ok(())
}

pub async fn deployments_list(ctx: &Context, age_buffer: &str) -> anyhow::Result<()> {
    let buffer = parse_buffer(age_buffer)?;
    let drift = sweeper(ctx, buffer).scan_unlinked_deployments().await?;
    if drift.is_empty() {
        println!("no unlinked deployments older than {age_buffer}");
        return Ok(());
    }
    println!("{:<40} {:<24} {:>12}", "SHARD", "DEPLOYMENT", "AGE (s)");
    for record in drift {
        if let DriftRecord::UnlinkedDeployment {
            shard,
            did,
            age_secs,
        } = record
        {
            println!("{shard:<40} {did:<24} {age_secs:>12}");
        }
    }
    Ok(())
}

pub async fn deployments_remove(ctx: &Context, age_buffer: &str, yes: bool) -> anyhow::Result<()> {
    let buffer = parse_buffer(age_buffer)?;
    let sweeper = sweeper(ctx, buffer);
    let drift = sweeper.scan_unlinked_deployments().await?;
    if drift.is_empty() {
        println!("no unlinked deployments older than {age_buffer}");
        return Ok(());
    }
    let prompt = format!(
        "Delete {} unlinked deployment(s) from their engines?",
        drift.len()
    );
    if !confirm(&prompt, yes)? {
        println!("aborted");
        return Ok(());
    }
    let removed = sweeper.delete_unlinked_deployments().await?;
    println!("{removed} unlinked deployment(s) deleted");
    Ok(())
}
