//! Embedded-replica synchronization.
//!
//! A replica serves reads and writes from a local SQLite file. Each write
//! also appends the row-level [`Change`]s it made to the local
//! `sync_changes` log, inside the same transaction. A sync then:
//!
//! 1. replays pending changes on the remote, in one remote transaction,
//!    with idempotent statements;
//! 2. reads the remote graph and replaces the local tables with it, in one
//!    local transaction that also drops the pushed log entries.
//!
//! Any failure leaves the log in place, so the next sync retries.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::backend::{Backend, Row, Session, SqliteBackend, Statement};
use crate::error::{GraphError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Changes
// ─────────────────────────────────────────────────────────────────────────────

/// A row-level change made by a graph operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Change {
    InsertEntity {
        name: String,
        entity_type: String,
    },
    InsertObservation {
        entity_name: String,
        content: String,
    },
    InsertRelation {
        from: String,
        to: String,
        relation_type: String,
    },
    DeleteEntity {
        name: String,
    },
    DeleteObservation {
        entity_name: String,
        content: String,
    },
    DeleteRelation {
        from: String,
        to: String,
        relation_type: String,
    },
}

impl Change {
    /// Statements that apply this change to another store.
    ///
    /// Replaying a change that already landed is a no-op.
    pub(crate) fn replay_statements(&self) -> Vec<Statement> {
        match self {
            Change::InsertEntity { name, entity_type } => vec![
                Statement::new(
                    "INSERT INTO entities (name, entity_type) VALUES (?, ?) \
                     ON CONFLICT(name) DO NOTHING",
                )
                .bind(name)
                .bind(entity_type),
            ],
            // The owning entity may be gone on the remote.
            Change::InsertObservation {
                entity_name,
                content,
            } => vec![
                Statement::new(
                    "INSERT INTO observations (entity_name, content) \
                     SELECT ?, ? WHERE EXISTS (SELECT 1 FROM entities WHERE name = ?) \
                     ON CONFLICT(entity_name, content) DO NOTHING",
                )
                .bind(entity_name)
                .bind(content)
                .bind(entity_name),
            ],
            Change::InsertRelation {
                from,
                to,
                relation_type,
            } => vec![
                Statement::new(
                    "INSERT INTO relations (from_entity, to_entity, relation_type) \
                     VALUES (?, ?, ?) \
                     ON CONFLICT(from_entity, to_entity, relation_type) DO NOTHING",
                )
                .bind(from)
                .bind(to)
                .bind(relation_type),
            ],
            Change::DeleteEntity { name } => vec![
                Statement::new("DELETE FROM observations WHERE entity_name = ?").bind(name),
                Statement::new("DELETE FROM relations WHERE from_entity = ? OR to_entity = ?")
                    .bind(name)
                    .bind(name),
                Statement::new("DELETE FROM entities WHERE name = ?").bind(name),
            ],
            Change::DeleteObservation {
                entity_name,
                content,
            } => vec![
                Statement::new("DELETE FROM observations WHERE entity_name = ? AND content = ?")
                    .bind(entity_name)
                    .bind(content),
            ],
            Change::DeleteRelation {
                from,
                to,
                relation_type,
            } => vec![
                Statement::new(
                    "DELETE FROM relations \
                     WHERE from_entity = ? AND to_entity = ? AND relation_type = ?",
                )
                .bind(from)
                .bind(to)
                .bind(relation_type),
            ],
        }
    }

    /// Statement appending this change to the local log.
    pub(crate) fn log_statement(&self) -> Result<Statement> {
        let json = serde_json::to_string(self)?;
        Ok(Statement::new("INSERT INTO sync_changes (change) VALUES (?)").bind(json))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Replica
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of one synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Changes pushed to the remote.
    pub pushed: usize,
    /// Entities now held locally.
    pub entities: usize,
    /// Observations now held locally.
    pub observations: usize,
    /// Relations now held locally.
    pub relations: usize,
}

/// Remote graph rows, ordered by id.
#[derive(Debug, Default)]
struct Snapshot {
    entities: Vec<Row>,
    observations: Vec<Row>,
    relations: Vec<Row>,
}

/// A local SQLite replica of a remote store.
#[derive(Debug)]
pub struct Replica {
    local: SqliteBackend,
    remote: Arc<dyn Backend>,
    /// Serializes syncs.
    lock: Mutex<()>,
}

impl Replica {
    /// Pair a local replica with its sync target.
    pub fn new(local: SqliteBackend, remote: Arc<dyn Backend>) -> Self {
        Self {
            local,
            remote,
            lock: Mutex::new(()),
        }
    }

    /// The local store serving reads and writes.
    pub fn local(&self) -> &SqliteBackend {
        &self.local
    }

    /// The sync target.
    pub fn remote(&self) -> &Arc<dyn Backend> {
        &self.remote
    }

    /// Push pending changes, then pull the remote state.
    ///
    /// Errors come back as [`GraphError::SyncFailure`].
    pub async fn sync(&self) -> Result<SyncReport> {
        let _guard = self.lock.lock().await;
        let started = Instant::now();

        let report = self.run().await.map_err(GraphError::sync_failure)?;

        info!(
            remote = %self.remote.describe(),
            pushed = report.pushed,
            entities = report.entities,
            observations = report.observations,
            relations = report.relations,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "replica synced"
        );
        Ok(report)
    }

    /// Number of changes waiting to be pushed.
    pub async fn pending(&self) -> Result<usize> {
        let mut session = self.local.session().await?;
        let rows = session
            .query(Statement::new("SELECT COUNT(*) FROM sync_changes"))
            .await?;
        session.close().await?;
        count(&rows)
    }

    async fn run(&self) -> Result<SyncReport> {
        // Held until the pull lands so no local write slips in between.
        let mut local = self.local.session().await?;

        let pending = read_pending(local.as_mut()).await?;
        let last_seq = pending.last().map(|(seq, _)| *seq);

        let snapshot = self.exchange(&pending).await?;

        local.begin().await?;
        let report = match replace_local(local.as_mut(), &snapshot, last_seq).await {
            Ok(()) => SyncReport {
                pushed: pending.len(),
                entities: snapshot.entities.len(),
                observations: snapshot.observations.len(),
                relations: snapshot.relations.len(),
            },
            Err(e) => {
                if let Err(rollback) = local.rollback().await {
                    debug!(error = %rollback, "rollback after failed pull failed");
                }
                return Err(e);
            }
        };
        local.commit().await?;
        local.close().await?;

        Ok(report)
    }

    /// Push `pending` and read back the remote graph in one remote transaction.
    async fn exchange(&self, pending: &[(i64, Change)]) -> Result<Snapshot> {
        let mut remote = self.remote.session().await?;
        remote.begin().await?;

        for (seq, change) in pending {
            for stmt in change.replay_statements() {
                remote.execute(stmt).await?;
            }
            debug!(seq, "replayed change");
        }

        let snapshot = Snapshot {
            entities: remote
                .query(Statement::new(
                    "SELECT id, name, entity_type, created_at FROM entities ORDER BY id",
                ))
                .await?,
            observations: remote
                .query(Statement::new(
                    "SELECT id, entity_name, content, created_at FROM observations ORDER BY id",
                ))
                .await?,
            relations: remote
                .query(Statement::new(
                    "SELECT id, from_entity, to_entity, relation_type, created_at \
                     FROM relations ORDER BY id",
                ))
                .await?,
        };

        remote.commit().await?;
        remote.close().await?;
        Ok(snapshot)
    }
}

async fn read_pending(session: &mut dyn Session) -> Result<Vec<(i64, Change)>> {
    let rows = session
        .query(Statement::new(
            "SELECT seq, change FROM sync_changes ORDER BY seq",
        ))
        .await?;

    rows.iter()
        .map(|row| {
            let change: Change = serde_json::from_str(&row.text(1)?)?;
            Ok((row.integer(0)?, change))
        })
        .collect()
}

async fn replace_local(
    session: &mut dyn Session,
    snapshot: &Snapshot,
    last_seq: Option<i64>,
) -> Result<()> {
    session
        .execute(Statement::new("DELETE FROM observations"))
        .await?;
    session.execute(Statement::new("DELETE FROM relations")).await?;
    session.execute(Statement::new("DELETE FROM entities")).await?;

    for row in &snapshot.entities {
        session
            .execute(Statement::with_args(
                "INSERT INTO entities (id, name, entity_type, created_at) VALUES (?, ?, ?, ?)",
                row.0.clone(),
            ))
            .await?;
    }
    for row in &snapshot.observations {
        session
            .execute(Statement::with_args(
                "INSERT INTO observations (id, entity_name, content, created_at) \
                 VALUES (?, ?, ?, ?)",
                row.0.clone(),
            ))
            .await?;
    }
    for row in &snapshot.relations {
        session
            .execute(Statement::with_args(
                "INSERT INTO relations (id, from_entity, to_entity, relation_type, created_at) \
                 VALUES (?, ?, ?, ?, ?)",
                row.0.clone(),
            ))
            .await?;
    }

    if let Some(seq) = last_seq {
        session
            .execute(Statement::new("DELETE FROM sync_changes WHERE seq <= ?").bind(seq))
            .await?;
    }
    Ok(())
}

fn count(rows: &[Row]) -> Result<usize> {
    match rows.first() {
        Some(row) => Ok(row.integer(0)? as usize),
        None => Err(GraphError::protocol("COUNT(*) returned no rows")),
    }
}
