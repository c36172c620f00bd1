use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "flowctl",
    about = "Flowgate — control plane tooling for workflow engine shards",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Data directory holding the registry store.
    #[arg(long, global = true, default_value = "/var/lib/flowgate")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage engine shards and tenant assignments
    Shard {
        #[command(subcommand)]
        action: ShardAction,
    },
    /// Inspect and repair vid registry drift
    Vids {
        #[command(subcommand)]
        action: VidsAction,
    },
    /// Inspect and repair engine deployment drift
    Deployments {
        #[command(subcommand)]
        action: DeploymentsAction,
    },
    /// Discover tenant assignments from existing engine deployments.
    ///
    /// Pages through every shard's deployment list and writes the
    /// tenant assignments it finds back into the shard registry.
    Migrate {
        /// Deployments fetched per page.
        #[arg(long, default_value = "50")]
        batch_size: usize,
        /// Re-pin tenants that already have an assignment.
        #[arg(long)]
        force: bool,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum ShardAction {
    /// Register a shard (pings the engine first)
    Add {
        /// Engine base URL, e.g. http://engine-a:8080
        url: String,
    },
    /// De-register a shard and clear its tenant assignments
    Remove {
        url: String,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
    /// List shards with their tenant counts
    List,
}

#[derive(Subcommand)]
enum VidsAction {
    /// List vids whose engine deployment no longer exists
    ListUnlinked,
    /// Remove vids whose engine deployment no longer exists
    RemoveUnlinked {
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
enum DeploymentsAction {
    /// List engine deployments with no vid, older than the buffer
    ListUnlinked {
        /// Ignore deployments younger than this (e.g. "6h").
        #[arg(long, default_value = "6h")]
        age_buffer: String,
    },
    /// Delete engine deployments with no vid, older than the buffer
    RemoveUnlinked {
        /// Ignore deployments younger than this (e.g. "6h").
        #[arg(long, default_value = "6h")]
        age_buffer: String,
        /// Skip the confirmation prompt.
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("flowctl=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let ctx = commands::Context::open(&cli.data_dir)?;

    match cli.command {
        Commands::Shard { action } => match action {
            ShardAction::Add { url } => commands::shards::add(&ctx, &url).await,
            ShardAction::Remove { url, yes } => commands::shards::remove(&ctx, &url, yes).await,
            ShardAction::List => commands::shards::list(&ctx).await,
        },
        Commands::Vids { action } => match action {
            VidsAction::ListUnlinked => commands::drift::vids_list(&ctx).await,
            VidsAction::RemoveUnlinked { yes } => commands::drift::vids_remove(&ctx, yes).await,
        },
        Commands::Deployments { action } => match action {
            DeploymentsAction::ListUnlinked { age_buffer } => {
                commands::drift::deployments_list(&ctx, &age_buffer).await
            }
            DeploymentsAction::RemoveUnlinked { age_buffer, yes } => {
                commands::drift::deployments_remove(&ctx, &age_buffer, yes).await
            }
        },
        Commands::Migrate {
            batch_size,
            force,
            yes,
        } => commands::migrate::discover(&ctx, batch_size, force, yes).await,
    }
}
