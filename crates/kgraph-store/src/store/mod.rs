//! Knowledge graph store.
//!
//! Entities, observations and relations over whichever backend the live
//! [`Handle`] serves. Each operation runs in one transaction on one session;
//! mutating operations then hand over to the replica synchronizer.
//!
//! # Conflicts
//!
//! Duplicate entity names, observations and relation triples hit UNIQUE
//! constraints. Inserts carry `ON CONFLICT DO NOTHING`, so a duplicate lands
//! no row and is skipped on every backend; any error aborts the batch.

mod entity_ops;
mod observation_ops;
mod query;
mod relation_ops;

use std::sync::Arc;

use tracing::{debug, warn};

use crate::backend::{Row, Session, Statement};
use crate::connection::{ConnectionConfig, ConnectionManager, Handle};
use crate::error::Result;
use crate::sync::{Change, SyncReport};

// ─────────────────────────────────────────────────────────────────────────────
// Graph Store
// ─────────────────────────────────────────────────────────────────────────────

/// The graph operations, bound to a [`ConnectionManager`].
///
/// Cloning is cheap; clones share the manager.
#[derive(Debug, Clone, Default)]
pub struct GraphStore {
    manager: Arc<ConnectionManager>,
}

impl GraphStore {
    /// Create a store over `manager`.
    pub fn new(manager: Arc<ConnectionManager>) -> Self {
        Self { manager }
    }

    /// Connect a fresh manager and wrap it.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let manager = Arc::new(ConnectionManager::new());
        manager.connect(config).await?;
        Ok(Self { manager })
    }

    /// The connection manager.
    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    /// Synchronize now. Returns `None` in direct mode.
    pub async fn sync(&self) -> Result<Option<SyncReport>> {
        let handle = self.manager.handle().await?;
        match handle.replica() {
            Some(replica) => replica.sync().await.map(Some),
            None => Ok(None),
        }
    }

    /// Run the replica synchronizer after a committed write.
    async fn sync_if_needed(&self, handle: &Handle) -> Result<()> {
        if let Some(replica) = handle.replica() {
            replica.sync().await?;
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transactions
// ─────────────────────────────────────────────────────────────────────────────

/// One open transaction on a fresh session.
///
/// Records changes to the replica log when the handle is a replica. Dropping
/// a `Tx` without [`Tx::finish`] rolls it back.
pub(crate) struct Tx {
    session: Box<dyn Session>,
    record_changes: bool,
    recorded: usize,
}

impl Tx {
    pub(crate) async fn begin(handle: &Handle) -> Result<Self> {
        let mut session = handle.backend().session().await?;
        session.begin().await?;
        Ok(Self {
            session,
            record_changes: handle.replica().is_some(),
            recorded: 0,
        })
    }

    pub(crate) async fn execute(&mut self, stmt: Statement) -> Result<u64> {
        self.session.execute(stmt).await
    }

    pub(crate) async fn query(&mut self, stmt: Statement) -> Result<Vec<Row>> {
        self.session.query(stmt).await
    }

    /// Run an `INSERT ... ON CONFLICT DO NOTHING`; `false` when no row landed.
    pub(crate) async fn insert_or_skip(&mut self, stmt: Statement) -> Result<bool> {
        let affected = self.session.execute(stmt).await?;
        if affected == 0 {
            debug!("skipping duplicate row");
        }
        Ok(affected > 0)
    }

    /// Append a change to the replica log.
    pub(crate) async fn record(&mut self, change: Change) -> Result<()> {
        if self.record_changes {
            self.session.execute(change.log_statement()?).await?;
            self.recorded += 1;
        }
        Ok(())
    }

    /// Commit on `Ok`, roll back on `Err`, then end the session.
    pub(crate) async fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                self.session.commit().await?;
                if self.recorded > 0 {
                    debug!(changes = self.recorded, "changes logged for sync");
                }
                self.session.close().await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.session.rollback().await {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(e)
            }
        }
    }
}

/// Whether an entity named `name` exists.
pub(crate) async fn entity_exists(tx: &mut Tx, name: &str) -> Result<bool> {
    let rows = tx
        .query(Statement::new("SELECT 1 FROM entities WHERE name = ? LIMIT 1").bind(name))
        .await?;
    Ok(!rows.is_empty())
}
