//! Storage layout for the knowledge graph.
//!
//! Every statement is `IF NOT EXISTS`, so the scripts can run on each
//! connect against a fresh or an existing database.

use tracing::debug;

use crate::backend::Backend;
use crate::error::Result;

/// Graph tables and their lookup indexes.
pub const GRAPH_SCHEMA: &str = r#"
-- Entities: uniquely named nodes
CREATE TABLE IF NOT EXISTS entities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT UNIQUE NOT NULL,
    entity_type TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);

-- Observations: free text attached to an entity, unique per entity
CREATE TABLE IF NOT EXISTS observations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_name TEXT NOT NULL,
    content TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (entity_name) REFERENCES entities(name) ON DELETE CASCADE,
    UNIQUE (entity_name, content)
);

-- Relations: directed typed edges, unique per triple
CREATE TABLE IF NOT EXISTS relations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    from_entity TEXT NOT NULL,
    to_entity TEXT NOT NULL,
    relation_type TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (from_entity, to_entity, relation_type)
);

CREATE INDEX IF NOT EXISTS idx_observations_entity_name
    ON observations(entity_name);

CREATE INDEX IF NOT EXISTS idx_relations_from
    ON relations(from_entity);

CREATE INDEX IF NOT EXISTS idx_relations_to
    ON relations(to_entity);
"#;

/// Local change log of an embedded replica.
///
/// Rows are JSON-encoded changes waiting to be pushed, in `seq` order.
pub const CHANGE_LOG_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS sync_changes (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    change TEXT NOT NULL,
    created_at DATETIME DEFAULT CURRENT_TIMESTAMP
);
"#;

/// Create the graph tables and indexes if absent.
pub async fn ensure_graph_schema(backend: &dyn Backend) -> Result<()> {
    backend.execute_script(GRAPH_SCHEMA).await?;
    debug!(store = %backend.describe(), "graph schema ensured");
    Ok(())
}

/// Create the replica change log if absent.
pub async fn ensure_change_log(backend: &dyn Backend) -> Result<()> {
    backend.execute_script(CHANGE_LOG_SCHEMA).await?;
    debug!(store = %backend.describe(), "change log ensured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SqliteBackend, Statement};

    async fn object_names(backend: &SqliteBackend, kind: &str) -> Vec<String> {
        let mut session = backend.session().await.unwrap();
        session
            .query(
                Statement::new("SELECT name FROM sqlite_master WHERE type = ? ORDER BY name")
                    .bind(kind),
            )
            .await
            .unwrap()
            .iter()
            .map(|row| row.text(0).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_schema_is_idempotent() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        ensure_graph_schema(&backend).await.unwrap();
        ensure_graph_schema(&backend).await.unwrap();

        let tables = object_names(&backend, "table").await;
        for table in ["entities", "observations", "relations"] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
        assert!(!tables.contains(&"sync_changes".to_string()));
    }

    #[tokio::test]
    async fn test_indexes_exist() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        ensure_graph_schema(&backend).await.unwrap();

        let indexes = object_names(&backend, "index").await;
        for index in [
            "idx_observations_entity_name",
            "idx_relations_from",
            "idx_relations_to",
        ] {
            assert!(indexes.contains(&index.to_string()), "missing {index}");
        }
    }

    #[tokio::test]
    async fn test_observations_cascade_on_entity_delete() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        ensure_graph_schema(&backend).await.unwrap();

        let mut session = backend.session().await.unwrap();
        session
            .execute(Statement::with_args(
                "INSERT INTO entities (name, entity_type) VALUES (?, ?)",
                ["Alice", "person"],
            ))
            .await
            .unwrap();
        session
            .execute(Statement::with_args(
                "INSERT INTO observations (entity_name, content) VALUES (?, ?)",
                ["Alice", "likes tea"],
            ))
            .await
            .unwrap();
        session
            .execute(Statement::with_args(
                "DELETE FROM entities WHERE name = ?",
                ["Alice"],
            ))
            .await
            .unwrap();

        let rows = session
            .query(Statement::new("SELECT COUNT(*) FROM observations"))
            .await
            .unwrap();
        assert_eq!(rows[0].integer(0).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_change_log() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        ensure_change_log(&backend).await.unwrap();
        ensure_change_log(&backend).await.unwrap();
        assert!(object_names(&backend, "table")
            .await
            .contains(&"sync_changes".to_string()));
    }
}
