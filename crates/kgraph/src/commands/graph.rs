//! Graph commands - one-shot store operations.

use anyhow::Result;
use clap::Subcommand;
use tracing::debug;

use super::{Context, parse_input};
use crate::ops::{DeleteEntitiesArgs, OpenNodesArgs, Operation, SearchNodesArgs};

#[derive(Subcommand, Debug)]
pub enum GraphCommand {
    /// Create entities; prints the ones that were new
    CreateEntities {
        /// {"entities": [{"name", "entityType", "observations"}]} (inline, @file or -)
        input: String,
    },

    /// Create relations; prints the ones that were new
    CreateRelations {
        /// {"relations": [{"from", "to", "relationType"}]} (inline, @file or -)
        input: String,
    },

    /// Add observations to existing entities
    AddObservations {
        /// {"observations": [{"entityName", "contents"}]} (inline, @file or -)
        input: String,
    },

    /// Delete entities with their observations and relations
    DeleteEntities {
        /// Entity names
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Delete specific observations
    DeleteObservations {
        /// {"deletions": [{"entityName", "observations"}]} (inline, @file or -)
        input: String,
    },

    /// Delete relations
    DeleteRelations {
        /// {"relations": [{"from", "to", "relationType"}]} (inline, @file or -)
        input: String,
    },

    /// Print the whole graph
    ReadGraph,

    /// Case-insensitive substring search over names, types and observations
    SearchNodes {
        /// Text to look for
        query: String,
    },

    /// Print the named entities and the relations between them
    OpenNodes {
        /// Entity names
        names: Vec<String>,
    },

    /// Show entity, observation and relation counts
    Stats,
}

impl GraphCommand {
    fn into_operation(self) -> Result<Operation> {
        let op = match self {
            Self::CreateEntities { input } => {
                Operation::parse("create_entities", parse_input(&input)?)?
            }
            Self::CreateRelations { input } => {
                Operation::parse("create_relations", parse_input(&input)?)?
            }
            Self::AddObservations { input } => {
                Operation::parse("add_observations", parse_input(&input)?)?
            }
            Self::DeleteEntities { names } => {
                Operation::DeleteEntities(DeleteEntitiesArgs {
                    entity_names: names,
                })
            }
            Self::DeleteObservations { input } => {
                Operation::parse("delete_observations", parse_input(&input)?)?
            }
            Self::DeleteRelations { input } => {
                Operation::parse("delete_relations", parse_input(&input)?)?
            }
            Self::ReadGraph => Operation::ReadGraph,
            Self::SearchNodes { query } => Operation::SearchNodes(SearchNodesArgs { query }),
            Self::OpenNodes { names } => Operation::OpenNodes(OpenNodesArgs { names }),
            Self::Stats => Operation::Stats,
        };
        Ok(op)
    }
}

/// Run a graph command.
pub async fn run(command: GraphCommand, ctx: &Context) -> Result<()> {
    let op = command.into_operation()?;
    let name = op.name();
    let store = ctx.connect().await?;

    let result = op.execute(store).await?;
    debug!(op = name, "completed");
    if !result.is_null() {
        ctx.print_json(&result)?;
    }
    Ok(())
}
