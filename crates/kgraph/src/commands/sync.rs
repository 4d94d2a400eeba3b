//! Sync command - reconcile the local replica with the remote store.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tracing::info;

use kgraph_store::{Mode, SyncReport};

use super::Context;

/// Arguments for the sync command.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Only report how many local changes await upload
    #[arg(long)]
    pub pending: bool,
}

#[derive(Serialize)]
struct SyncOutput {
    mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pending: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    report: Option<SyncReport>,
}

/// Run the sync command.
pub async fn run(args: SyncArgs, ctx: &Context) -> Result<()> {
    let store = ctx.connect().await?;
    let handle = store.manager().handle().await?;

    let Some(replica) = handle.replica() else {
        info!("direct mode, nothing to synchronize");
        return ctx.print_json(&SyncOutput {
            mode: Mode::Direct,
            pending: None,
            report: None,
        });
    };

    let output = if args.pending {
        SyncOutput {
            mode: Mode::Replica,
            pending: Some(replica.pending().await?),
            report: None,
        }
    } else {
        SyncOutput {
            mode: Mode::Replica,
            pending: None,
            report: Some(replica.sync().await?),
        }
    };
    ctx.print_json(&output)
}
