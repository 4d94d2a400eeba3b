//! Plain-data records exchanged with callers.
//!
//! Field names serialize in camelCase so JSON payloads keep the
//! `entityType` / `relationType` / `entityName` shape used by memory tools.

use serde::{Deserialize, Serialize};

/// A uniquely named node carrying a type tag and free-text observations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    /// Unique, immutable identifier.
    pub name: String,
    /// Free-text category (e.g. "person", "project").
    pub entity_type: String,
    /// Observations in insertion order.
    #[serde(default)]
    pub observations: Vec<String>,
}

impl Entity {
    /// Create an entity with no observations.
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            observations: Vec::new(),
        }
    }

    /// Append an observation.
    pub fn with_observation(mut self, observation: impl Into<String>) -> Self {
        self.observations.push(observation.into());
        self
    }
}

/// A directed, typed edge between two entity names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    /// Name of the entity where the relation starts.
    pub from: String,
    /// Name of the entity where the relation ends.
    pub to: String,
    /// Relation type, conventionally in active voice ("knows", "works_at").
    pub relation_type: String,
}

impl Relation {
    /// Create a new relation.
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            relation_type: relation_type.into(),
        }
    }
}

/// A set of entities together with relations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGraph {
    #[serde(default)]
    pub entities: Vec<Entity>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl KnowledgeGraph {
    /// Whether the graph holds no entities and no relations.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }

    /// Look up an entity by name.
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.iter().find(|e| e.name == name)
    }
}

/// Observations to append to one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationInput {
    pub entity_name: String,
    pub contents: Vec<String>,
}

impl ObservationInput {
    pub fn new<I, S>(entity_name: impl Into<String>, contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity_name: entity_name.into(),
            contents: contents.into_iter().map(Into::into).collect(),
        }
    }
}

/// Observations that were actually inserted for one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationResult {
    pub entity_name: String,
    pub added_observations: Vec<String>,
}

/// Observations to remove from one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationDeletion {
    pub entity_name: String,
    pub observations: Vec<String>,
}

impl ObservationDeletion {
    pub fn new<I, S>(entity_name: impl Into<String>, observations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity_name: entity_name.into(),
            observations: observations.into_iter().map(Into::into).collect(),
        }
    }
}

/// Row counts of the three graph tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphStats {
    pub entity_count: usize,
    pub observation_count: usize,
    pub relation_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_serializes_camel_case() {
        let entity = Entity::new("Alice", "person").with_observation("likes tea");
        let json = serde_json::to_value(&entity).unwrap();
        assert_eq!(json["entityType"], "person");
        assert_eq!(json["observations"][0], "likes tea");
    }

    #[test]
    fn test_relation_deserializes_tool_shape() {
        let rel: Relation =
            serde_json::from_str(r#"{"from":"Alice","to":"Bob","relationType":"knows"}"#).unwrap();
        assert_eq!(rel, Relation::new("Alice", "Bob", "knows"));
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let stats = GraphStats {
            entity_count: 2,
            observation_count: 3,
            relation_count: 1,
        };
        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["entityCount"], 2);
        assert_eq!(json["observationCount"], 3);
        assert_eq!(json["relationCount"], 1);
    }

    #[test]
    fn test_entity_without_observations_field() {
        let entity: Entity =
            serde_json::from_str(r#"{"name":"Bob","entityType":"person"}"#).unwrap();
        assert!(entity.observations.is_empty());
    }

    #[test]
    fn test_graph_lookup() {
        let graph = KnowledgeGraph {
            entities: vec![Entity::new("Alice", "person")],
            relations: Vec::new(),
        };
        assert!(!graph.is_empty());
        assert!(graph.entity("Alice").is_some());
        assert!(graph.entity("Bob").is_none());
    }
}
