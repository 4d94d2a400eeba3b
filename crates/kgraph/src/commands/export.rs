//! Export command - dump the whole graph as JSON.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use tracing::info;

use super::{Context, to_json};

/// Arguments for the export command.
#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output file (stdout if not specified)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Run the export command.
pub async fn run(args: ExportArgs, ctx: &Context) -> Result<()> {
    let store = ctx.connect().await?;
    let graph = store.read_graph().await?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, to_json(&graph, ctx.compact)?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(
                path = %path.display(),
                entities = graph.entities.len(),
                relations = graph.relations.len(),
                "graph exported"
            );
        }
        None => ctx.print_json(&graph)?,
    }
    Ok(())
}
