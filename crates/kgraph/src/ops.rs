//! Graph operations addressed by name.
//!
//! Shared by the one-shot subcommands and the `serve` request loop. Argument
//! objects keep the memory tool shapes (`{"entities": [...]}`,
//! `{"entityNames": [...]}` and so on).

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kgraph_store::{
    Entity, GraphError, GraphStore, ObservationDeletion, ObservationInput, Relation,
};

/// A request that could not be run.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("invalid arguments for {op}: {source}")]
    InvalidArguments {
        op: String,
        source: serde_json::Error,
    },

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl RequestError {
    /// Stable name reported to `serve` clients.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownOperation(_) | Self::InvalidArguments { .. } => "InvalidRequest",
            Self::Graph(e) => e.kind(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateEntitiesArgs {
    pub entities: Vec<Entity>,
}

#[derive(Debug, Deserialize)]
pub struct RelationsArgs {
    pub relations: Vec<Relation>,
}

#[derive(Debug, Deserialize)]
pub struct AddObservationsArgs {
    pub observations: Vec<ObservationInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteEntitiesArgs {
    pub entity_names: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteObservationsArgs {
    pub deletions: Vec<ObservationDeletion>,
}

#[derive(Debug, Deserialize)]
pub struct SearchNodesArgs {
    pub query: String,
}

#[derive(Debug, Deserialize)]
pub struct OpenNodesArgs {
    pub names: Vec<String>,
}

/// One graph operation with its arguments.
#[derive(Debug)]
pub enum Operation {
    CreateEntities(CreateEntitiesArgs),
    CreateRelations(RelationsArgs),
    AddObservations(AddObservationsArgs),
    DeleteEntities(DeleteEntitiesArgs),
    DeleteObservations(DeleteObservationsArgs),
    DeleteRelations(RelationsArgs),
    ReadGraph,
    SearchNodes(SearchNodesArgs),
    OpenNodes(OpenNodesArgs),
    Stats,
    Sync,
}

impl Operation {
    /// Resolve an operation name and its JSON arguments.
    pub fn parse(op: &str, args: Value) -> Result<Self, RequestError> {
        Ok(match op {
            "create_entities" => Self::CreateEntities(decode(op, args)?),
            "create_relations" => Self::CreateRelations(decode(op, args)?),
            "add_observations" => Self::AddObservations(decode(op, args)?),
            "delete_entities" => Self::DeleteEntities(decode(op, args)?),
            "delete_observations" => Self::DeleteObservations(decode(op, args)?),
            "delete_relations" => Self::DeleteRelations(decode(op, args)?),
            "read_graph" => Self::ReadGraph,
            "search_nodes" => Self::SearchNodes(decode(op, args)?),
            "open_nodes" => Self::OpenNodes(decode(op, args)?),
            "stats" => Self::Stats,
            "sync" => Self::Sync,
            other => return Err(RequestError::UnknownOperation(other.to_string())),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateEntities(_) => "create_entities",
            Self::CreateRelations(_) => "create_relations",
            Self::AddObservations(_) => "add_observations",
            Self::DeleteEntities(_) => "delete_entities",
            Self::DeleteObservations(_) => "delete_observations",
            Self::DeleteRelations(_) => "delete_relations",
            Self::ReadGraph => "read_graph",
            Self::SearchNodes(_) => "search_nodes",
            Self::OpenNodes(_) => "open_nodes",
            Self::Stats => "stats",
            Self::Sync => "sync",
        }
    }

    /// Run against `store`. Deletions yield `null`.
    pub async fn execute(self, store: &GraphStore) -> Result<Value, RequestError> {
        let value = match self {
            Self::CreateEntities(a) => encode(store.create_entities(a.entities).await?)?,
            Self::CreateRelations(a) => encode(store.create_relations(a.relations).await?)?,
            Self::AddObservations(a) => encode(store.add_observations(a.observations).await?)?,
            Self::DeleteEntities(a) => {
                store.delete_entities(a.entity_names).await?;
                Value::Null
            }
            Self::DeleteObservations(a) => {
                store.delete_observations(a.deletions).await?;
                Value::Null
            }
            Self::DeleteRelations(a) => {
                store.delete_relations(a.relations).await?;
                Value::Null
            }
            Self::ReadGraph => encode(store.read_graph().await?)?,
            Self::SearchNodes(a) => encode(store.search_nodes(&a.query).await?)?,
            Self::OpenNodes(a) => encode(store.open_nodes(a.names).await?)?,
            Self::Stats => encode(store.stats().await?)?,
            Self::Sync => encode(store.sync().await?)?,
        };
        Ok(value)
    }
}

fn encode<T: Serialize>(value: T) -> Result<Value, RequestError> {
    Ok(serde_json::to_value(value).map_err(GraphError::from)?)
}

fn decode<T: DeserializeOwned>(op: &str, args: Value) -> Result<T, RequestError> {
    serde_json::from_value(args).map_err(|source| RequestError::InvalidArguments {
        op: op.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_tool_shapes() {
        let op = Operation::parse(
            "create_entities",
            json!({"entities": [{"name": "Alice", "entityType": "person", "observations": ["likes tea"]}]}),
        )
        .unwrap();
        match op {
            Operation::CreateEntities(args) => {
                assert_eq!(args.entities[0].name, "Alice");
                assert_eq!(args.entities[0].observations, vec!["likes tea"]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let op = Operation::parse("delete_entities", json!({"entityNames": ["Alice"]})).unwrap();
        assert_eq!(op.name(), "delete_entities");
    }

    #[test]
    fn test_argless_operations_ignore_args() {
        assert_eq!(
            Operation::parse("read_graph", Value::Null).unwrap().name(),
            "read_graph"
        );
        assert_eq!(
            Operation::parse("stats", json!({})).unwrap().name(),
            "stats"
        );
    }

    #[test]
    fn test_unknown_operation() {
        let err = Operation::parse("drop_tables", Value::Null).unwrap_err();
        assert!(matches!(err, RequestError::UnknownOperation(_)));
        assert_eq!(err.kind(), "InvalidRequest");
    }

    #[test]
    fn test_missing_arguments() {
        let err = Operation::parse("search_nodes", Value::Null).unwrap_err();
        assert!(matches!(err, RequestError::InvalidArguments { .. }));
        assert!(err.to_string().contains("search_nodes"));
    }

    #[test]
    fn test_graph_error_kind_passes_through() {
        let err = RequestError::from(GraphError::NotFound("Ghost".to_string()));
        assert_eq!(err.kind(), "NotFound");
        assert_eq!(err.to_string(), "Entity with name Ghost not found");
    }

    #[tokio::test]
    async fn test_execute_against_memory_store() {
        let store = GraphStore::connect(&kgraph_store::ConnectionConfig::new(":memory:"))
            .await
            .unwrap();

        let created = Operation::parse(
            "create_entities",
            json!({"entities": [{"name": "Alice", "entityType": "person"}]}),
        )
        .unwrap()
        .execute(&store)
        .await
        .unwrap();
        assert_eq!(created[0]["name"], "Alice");

        let deleted = Operation::parse("delete_entities", json!({"entityNames": ["Alice"]}))
            .unwrap()
            .execute(&store)
            .await
            .unwrap();
        assert!(deleted.is_null());

        let stats = Operation::Stats.execute(&store).await.unwrap();
        assert_eq!(stats["entityCount"], 0);

        store.manager().teardown().await.unwrap();
    }
}
