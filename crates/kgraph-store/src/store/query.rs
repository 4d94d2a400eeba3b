//! Read-side operations: whole-graph read, substring search, lookup by name.

use std::collections::HashMap;

use tracing::debug;

use crate::backend::{Row, Statement, placeholders};
use crate::error::{GraphError, Result};
use crate::types::{Entity, GraphStats, KnowledgeGraph, Relation};

use super::{GraphStore, Tx};

impl GraphStore {
    /// Every entity with its observations, and every relation.
    ///
    /// Entities, observations and relations come back in insertion order.
    pub async fn read_graph(&self) -> Result<KnowledgeGraph> {
        let handle = self.manager.handle().await?;

        let mut tx = Tx::begin(&handle).await?;
        let result = read_graph_in(&mut tx).await;
        let graph = tx.finish(result).await?;

        debug!(
            entities = graph.entities.len(),
            relations = graph.relations.len(),
            "read_graph"
        );
        Ok(graph)
    }

    /// Entities whose name, type or any observation contains `query`
    /// (ASCII case-insensitive), plus the relations among them.
    pub async fn search_nodes(&self, query: &str) -> Result<KnowledgeGraph> {
        let handle = self.manager.handle().await?;
        let pattern = format!("%{}%", escape_like(&query.to_ascii_lowercase()));

        let mut tx = Tx::begin(&handle).await?;
        let result = search_nodes_in(&mut tx, &pattern).await;
        let graph = tx.finish(result).await?;

        debug!(
            query,
            entities = graph.entities.len(),
            relations = graph.relations.len(),
            "search_nodes"
        );
        Ok(graph)
    }

    /// Entities with exactly these names, plus the relations among them.
    /// Unknown names are left out.
    pub async fn open_nodes(&self, names: Vec<String>) -> Result<KnowledgeGraph> {
        let handle = self.manager.handle().await?;
        if names.is_empty() {
            return Ok(KnowledgeGraph::default());
        }

        let mut names = names;
        dedup_preserving_order(&mut names);

        let mut tx = Tx::begin(&handle).await?;
        let result = open_nodes_in(&mut tx, &names).await;
        let graph = tx.finish(result).await?;

        debug!(
            requested = names.len(),
            entities = graph.entities.len(),
            relations = graph.relations.len(),
            "open_nodes"
        );
        Ok(graph)
    }

    /// Row counts of the graph tables.
    pub async fn stats(&self) -> Result<GraphStats> {
        let handle = self.manager.handle().await?;

        let mut tx = Tx::begin(&handle).await?;
        let result = stats_in(&mut tx).await;
        tx.finish(result).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Queries
// ─────────────────────────────────────────────────────────────────────────────

async fn read_graph_in(tx: &mut Tx) -> Result<KnowledgeGraph> {
    let entity_rows = tx
        .query(Statement::new(
            "SELECT name, entity_type FROM entities ORDER BY id",
        ))
        .await?;
    let observation_rows = tx
        .query(Statement::new(
            "SELECT entity_name, content FROM observations ORDER BY id",
        ))
        .await?;
    let relation_rows = tx
        .query(Statement::new(
            "SELECT from_entity, to_entity, relation_type FROM relations ORDER BY id",
        ))
        .await?;

    Ok(KnowledgeGraph {
        entities: assemble_entities(&entity_rows, &observation_rows)?,
        relations: relation_rows
            .iter()
            .map(row_to_relation)
            .collect::<Result<_>>()?,
    })
}

async fn search_nodes_in(tx: &mut Tx, pattern: &str) -> Result<KnowledgeGraph> {
    let entity_rows = tx
        .query(
            Statement::new(
                r#"
                SELECT e.name, e.entity_type FROM entities e
                WHERE LOWER(e.name) LIKE ?1 ESCAPE '\'
                   OR LOWER(e.entity_type) LIKE ?1 ESCAPE '\'
                   OR EXISTS (
                        SELECT 1 FROM observations o
                        WHERE o.entity_name = e.name
                          AND LOWER(o.content) LIKE ?1 ESCAPE '\'
                   )
                ORDER BY e.id
                "#,
            )
            .bind(pattern),
        )
        .await?;

    let names = entity_rows
        .iter()
        .map(|row| row.text(0))
        .collect::<Result<Vec<_>>>()?;
    subgraph(tx, entity_rows, &names).await
}

async fn open_nodes_in(tx: &mut Tx, names: &[String]) -> Result<KnowledgeGraph> {
    let entity_rows = tx
        .query(Statement::with_args(
            format!(
                "SELECT name, entity_type FROM entities WHERE name IN ({}) ORDER BY id",
                placeholders(names.len())
            ),
            names,
        ))
        .await?;

    let found = entity_rows
        .iter()
        .map(|row| row.text(0))
        .collect::<Result<Vec<_>>>()?;
    subgraph(tx, entity_rows, &found).await
}

/// Attach observations to `entity_rows` and collect relations among `names`.
async fn subgraph(tx: &mut Tx, entity_rows: Vec<Row>, names: &[String]) -> Result<KnowledgeGraph> {
    if names.is_empty() {
        return Ok(KnowledgeGraph::default());
    }
    let marks = placeholders(names.len());

    let observation_rows = tx
        .query(Statement::with_args(
            format!(
                "SELECT entity_name, content FROM observations \
                 WHERE entity_name IN ({marks}) ORDER BY id"
            ),
            names,
        ))
        .await?;
    let relation_rows = tx
        .query(Statement::with_args(
            format!(
                "SELECT from_entity, to_entity, relation_type FROM relations \
                 WHERE from_entity IN ({marks}) AND to_entity IN ({marks}) ORDER BY id"
            ),
            names.iter().chain(names.iter()),
        ))
        .await?;

    Ok(KnowledgeGraph {
        entities: assemble_entities(&entity_rows, &observation_rows)?,
        relations: relation_rows
            .iter()
            .map(row_to_relation)
            .collect::<Result<_>>()?,
    })
}

async fn stats_in(tx: &mut Tx) -> Result<GraphStats> {
    let rows = tx
        .query(Statement::new(
            r#"
            SELECT
                (SELECT COUNT(*) FROM entities),
                (SELECT COUNT(*) FROM observations),
                (SELECT COUNT(*) FROM relations)
            "#,
        ))
        .await?;
    let row = rows
        .first()
        .ok_or_else(|| GraphError::protocol("stats query returned no rows"))?;

    Ok(GraphStats {
        entity_count: row.integer(0)? as usize,
        observation_count: row.integer(1)? as usize,
        relation_count: row.integer(2)? as usize,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Build entities from `(name, entity_type)` rows and `(entity_name, content)`
/// rows, keeping both orders.
fn assemble_entities(entity_rows: &[Row], observation_rows: &[Row]) -> Result<Vec<Entity>> {
    let mut entities = Vec::with_capacity(entity_rows.len());
    let mut index = HashMap::with_capacity(entity_rows.len());

    for row in entity_rows {
        let entity = Entity::new(row.text(0)?, row.text(1)?);
        index.insert(entity.name.clone(), entities.len());
        entities.push(entity);
    }

    for row in observation_rows {
        let name = row.text(0)?;
        if let Some(&idx) = index.get(&name) {
            entities[idx].observations.push(row.text(1)?);
        }
    }

    Ok(entities)
}

fn row_to_relation(row: &Row) -> Result<Relation> {
    Ok(Relation::new(row.text(0)?, row.text(1)?, row.text(2)?))
}

/// Escape LIKE wildcards so they match literally (`ESCAPE '\'`).
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn dedup_preserving_order(names: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::with_capacity(names.len());
    names.retain(|name| seen.insert(name.clone()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("tea"), "tea");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("a_b"), "a\\_b");
        assert_eq!(escape_like("c:\\dir"), "c:\\\\dir");
    }

    #[test]
    fn test_dedup_preserving_order() {
        let mut names = vec!["b".to_string(), "a".to_string(), "b".to_string()];
        dedup_preserving_order(&mut names);
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_assemble_entities_keeps_order() {
        use crate::backend::Value;

        let entity_rows = vec![
            Row(vec![Value::from("Alice"), Value::from("person")]),
            Row(vec![Value::from("Bob"), Value::from("person")]),
        ];
        let observation_rows = vec![
            Row(vec![Value::from("Bob"), Value::from("b1")]),
            Row(vec![Value::from("Alice"), Value::from("a1")]),
            Row(vec![Value::from("Ghost"), Value::from("boo")]),
            Row(vec![Value::from("Alice"), Value::from("a2")]),
        ];

        let entities = assemble_entities(&entity_rows, &observation_rows).unwrap();
        assert_eq!(entities[0].name, "Alice");
        assert_eq!(entities[0].observations, vec!["a1", "a2"]);
        assert_eq!(entities[1].observations, vec!["b1"]);
    }
}
