//! Import command - load an exported graph.

use anyhow::{Context as _, Result};
use clap::Args;
use serde::Serialize;

use kgraph_store::{KnowledgeGraph, ObservationInput};

use super::{Context, read_input};

/// Arguments for the import command.
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Graph JSON as written by `export` (inline, @file or -)
    pub input: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImportSummary {
    entities_created: usize,
    observations_added: usize,
    relations_created: usize,
}

/// Run the import command.
///
/// Entities go in first so relations land after their endpoints. Observations
/// of entities that already exist are merged in; nothing is removed.
pub async fn run(args: ImportArgs, ctx: &Context) -> Result<()> {
    let text = read_input(&args.input)?;
    let graph: KnowledgeGraph =
        serde_json::from_str(&text).context("input is not a knowledge graph")?;

    let observations: Vec<ObservationInput> = graph
        .entities
        .iter()
        .filter(|e| !e.observations.is_empty())
        .map(|e| ObservationInput::new(e.name.clone(), e.observations.iter().cloned()))
        .collect();

    let store = ctx.connect().await?;
    let entities = store.create_entities(graph.entities).await?;
    let added = store.add_observations(observations).await?;
    let relations = store.create_relations(graph.relations).await?;

    ctx.print_json(&ImportSummary {
        entities_created: entities.len(),
        observations_added: added.iter().map(|r| r.added_observations.len()).sum(),
        relations_created: relations.len(),
    })
}
