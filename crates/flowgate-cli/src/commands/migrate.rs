//! Tenant assignment discovery.

use flowgate_sweep::discover_assignments;

use super::{confirm, Context};

pub async fn discover(
    ctx: &Context,
    batch_size: usize,
    force: bool,
    yes: bool,
) -> anyhow::Result<()> {
    if force {
        let prompt = "Re-pin tenants that already have an assignment?";
        if !confirm(prompt, yes)? {
            println!("aborted");
            return Ok(());
        }
    }
    let report = discover_assignments(&ctx.shards, &ctx.engines, batch_size, force).await?;
    println!(
        "scanned {} deployment(s): {} tenant(s) assigned, {} skipped",
        report.scanned, report.assigned, report.skipped
    );
    Ok(())
}
