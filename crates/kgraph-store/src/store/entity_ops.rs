//! Entity creation and deletion.

use tracing::debug;

use crate::backend::Statement;
use crate::error::Result;
use crate::sync::Change;
use crate::types::Entity;
use crate::validation::validate_entities;

use super::observation_ops::insert_observation;
use super::{GraphStore, Tx};

impl GraphStore {
    /// Create entities, skipping names that already exist.
    ///
    /// Returns the newly created entities as supplied. An existing entity
    /// keeps its observations; the observations passed along with it are
    /// ignored.
    pub async fn create_entities(&self, entities: Vec<Entity>) -> Result<Vec<Entity>> {
        validate_entities(&entities)?;
        let handle = self.manager.handle().await?;

        let mut tx = Tx::begin(&handle).await?;
        let result = create_entities_in(&mut tx, entities).await;
        let created = tx.finish(result).await?;

        debug!(created = created.len(), "create_entities");
        self.sync_if_needed(&handle).await?;
        Ok(created)
    }

    /// Delete entities with their observations and every relation touching
    /// them. Unknown names are ignored.
    pub async fn delete_entities(&self, names: Vec<String>) -> Result<()> {
        let handle = self.manager.handle().await?;

        let mut tx = Tx::begin(&handle).await?;
        let result = delete_entities_in(&mut tx, &names).await;
        let deleted = tx.finish(result).await?;

        debug!(requested = names.len(), deleted, "delete_entities");
        self.sync_if_needed(&handle).await?;
        Ok(())
    }
}

async fn create_entities_in(tx: &mut Tx, entities: Vec<Entity>) -> Result<Vec<Entity>> {
    let mut created = Vec::new();

    for entity in entities {
        let inserted = tx
            .insert_or_skip(
                Statement::new(
                    "INSERT INTO entities (name, entity_type) VALUES (?, ?) \
                     ON CONFLICT(name) DO NOTHING",
                )
                .bind(&entity.name)
                .bind(&entity.entity_type),
            )
            .await?;
        if !inserted {
            continue;
        }
        tx.record(Change::InsertEntity {
            name: entity.name.clone(),
            entity_type: entity.entity_type.clone(),
        })
        .await?;

        for content in &entity.observations {
            insert_observation(tx, &entity.name, content).await?;
        }
        created.push(entity);
    }

    Ok(created)
}

/// Returns how many of `names` named an existing entity.
async fn delete_entities_in(tx: &mut Tx, names: &[String]) -> Result<u64> {
    let mut deleted = 0;

    for name in names {
        let mut affected = tx
            .execute(Statement::new("DELETE FROM observations WHERE entity_name = ?").bind(name))
            .await?;
        affected += tx
            .execute(
                Statement::new("DELETE FROM relations WHERE from_entity = ? OR to_entity = ?")
                    .bind(name)
                    .bind(name),
            )
            .await?;
        let entity_rows = tx
            .execute(Statement::new("DELETE FROM entities WHERE name = ?").bind(name))
            .await?;

        deleted += entity_rows;
        if affected + entity_rows > 0 {
            tx.record(Change::DeleteEntity { name: name.clone() })
                .await?;
        }
    }

    Ok(deleted)
}
