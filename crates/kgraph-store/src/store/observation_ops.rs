//! Observation append and removal.

use tracing::debug;

use crate::backend::Statement;
use crate::error::{GraphError, Result};
use crate::sync::Change;
use crate::types::{ObservationDeletion, ObservationInput, ObservationResult};
use crate::validation::validate_observation_inputs;

use super::{GraphStore, Tx, entity_exists};

impl GraphStore {
    /// Append observations to existing entities.
    ///
    /// Returns, per input and in input order, the contents actually added.
    /// If any named entity is missing the call fails with
    /// [`GraphError::NotFound`] and nothing from the batch is written.
    pub async fn add_observations(
        &self,
        inputs: Vec<ObservationInput>,
    ) -> Result<Vec<ObservationResult>> {
        validate_observation_inputs(&inputs)?;
        let handle = self.manager.handle().await?;

        let mut tx = Tx::begin(&handle).await?;
        let result = add_observations_in(&mut tx, inputs).await;
        let results = tx.finish(result).await?;

        debug!(
            entities = results.len(),
            added = results
                .iter()
                .map(|r| r.added_observations.len())
                .sum::<usize>(),
            "add_observations"
        );
        self.sync_if_needed(&handle).await?;
        Ok(results)
    }

    /// Remove observations. Missing entities or contents are ignored.
    pub async fn delete_observations(&self, deletions: Vec<ObservationDeletion>) -> Result<()> {
        let handle = self.manager.handle().await?;

        let mut tx = Tx::begin(&handle).await?;
        let result = delete_observations_in(&mut tx, &deletions).await;
        let deleted = tx.finish(result).await?;

        debug!(deleted, "delete_observations");
        self.sync_if_needed(&handle).await?;
        Ok(())
    }
}

/// Insert one observation; `false` if the entity already has it.
pub(super) async fn insert_observation(
    tx: &mut Tx,
    entity_name: &str,
    content: &str,
) -> Result<bool> {
    let inserted = tx
        .insert_or_skip(
            Statement::new(
                "INSERT INTO observations (entity_name, content) VALUES (?, ?) \
                 ON CONFLICT(entity_name, content) DO NOTHING",
            )
            .bind(entity_name)
            .bind(content),
        )
        .await?;
    if inserted {
        tx.record(Change::InsertObservation {
            entity_name: entity_name.to_string(),
            content: content.to_string(),
        })
        .await?;
    }
    Ok(inserted)
}

async fn add_observations_in(
    tx: &mut Tx,
    inputs: Vec<ObservationInput>,
) -> Result<Vec<ObservationResult>> {
    let mut results = Vec::with_capacity(inputs.len());

    for input in inputs {
        if !entity_exists(tx, &input.entity_name).await? {
            return Err(GraphError::NotFound(input.entity_name));
        }

        let mut added = Vec::new();
        for content in input.contents {
            if insert_observation(tx, &input.entity_name, &content).await? {
                added.push(content);
            }
        }
        results.push(ObservationResult {
            entity_name: input.entity_name,
            added_observations: added,
        });
    }

    Ok(results)
}

async fn delete_observations_in(tx: &mut Tx, deletions: &[ObservationDeletion]) -> Result<u64> {
    let mut deleted = 0;

    for deletion in deletions {
        for content in &deletion.observations {
            let affected = tx
                .execute(
                    Statement::new(
                        "DELETE FROM observations WHERE entity_name = ? AND content = ?",
                    )
                    .bind(&deletion.entity_name)
                    .bind(content),
                )
                .await?;
            if affected > 0 {
                tx.record(Change::DeleteObservation {
                    entity_name: deletion.entity_name.clone(),
                    content: content.clone(),
                })
                .await?;
                deleted += affected;
            }
        }
    }

    Ok(deleted)
}
