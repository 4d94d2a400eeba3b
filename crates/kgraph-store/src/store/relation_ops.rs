//! Relation creation and deletion.

use tracing::debug;

use crate::backend::Statement;
use crate::connection::RelationPolicy;
use crate::error::{GraphError, Result};
use crate::sync::Change;
use crate::types::Relation;
use crate::validation::validate_relations;

use super::{GraphStore, Tx, entity_exists};

impl GraphStore {
    /// Create relations, skipping triples that already exist.
    ///
    /// Returns only the newly created relations. Under
    /// [`RelationPolicy::Strict`] a missing endpoint fails the whole batch
    /// with [`GraphError::NotFound`].
    pub async fn create_relations(&self, relations: Vec<Relation>) -> Result<Vec<Relation>> {
        validate_relations(&relations)?;
        let handle = self.manager.handle().await?;
        let policy = handle.relation_policy();

        let mut tx = Tx::begin(&handle).await?;
        let result = create_relations_in(&mut tx, relations, policy).await;
        let created = tx.finish(result).await?;

        debug!(created = created.len(), %policy, "create_relations");
        self.sync_if_needed(&handle).await?;
        Ok(created)
    }

    /// Delete the given triples. Absent triples are ignored.
    pub async fn delete_relations(&self, relations: Vec<Relation>) -> Result<()> {
        let handle = self.manager.handle().await?;

        let mut tx = Tx::begin(&handle).await?;
        let result = delete_relations_in(&mut tx, &relations).await;
        let deleted = tx.finish(result).await?;

        debug!(deleted, "delete_relations");
        self.sync_if_needed(&handle).await?;
        Ok(())
    }
}

async fn create_relations_in(
    tx: &mut Tx,
    relations: Vec<Relation>,
    policy: RelationPolicy,
) -> Result<Vec<Relation>> {
    let mut created = Vec::new();

    for relation in relations {
        if policy == RelationPolicy::Strict {
            for endpoint in [&relation.from, &relation.to] {
                if !entity_exists(tx, endpoint).await? {
                    return Err(GraphError::NotFound(endpoint.clone()));
                }
            }
        }

        let inserted = tx
            .insert_or_skip(
                Statement::new(
                    "INSERT INTO relations (from_entity, to_entity, relation_type) \
                     VALUES (?, ?, ?) \
                     ON CONFLICT(from_entity, to_entity, relation_type) DO NOTHING",
                )
                .bind(&relation.from)
                .bind(&relation.to)
                .bind(&relation.relation_type),
            )
            .await?;
        if !inserted {
            continue;
        }
        tx.record(Change::InsertRelation {
            from: relation.from.clone(),
            to: relation.to.clone(),
            relation_type: relation.relation_type.clone(),
        })
        .await?;
        created.push(relation);
    }

    Ok(created)
}

async fn delete_relations_in(tx: &mut Tx, relations: &[Relation]) -> Result<u64> {
    let mut deleted = 0;

    for relation in relations {
        let affected = tx
            .execute(
                Statement::new(
                    "DELETE FROM relations \
                     WHERE from_entity = ? AND to_entity = ? AND relation_type = ?",
                )
                .bind(&relation.from)
                .bind(&relation.to)
                .bind(&relation.relation_type),
            )
            .await?;
        if affected > 0 {
            tx.record(Change::DeleteRelation {
                from: relation.from.clone(),
                to: relation.to.clone(),
                relation_type: relation.relation_type.clone(),
            })
            .await?;
            deleted += affected;
        }
    }

    Ok(deleted)
}
