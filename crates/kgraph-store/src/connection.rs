//! Connection and schema management.
//!
//! [`ConnectionManager`] owns the process's single storage [`Handle`]. The
//! handle is either a direct connection to the configured store or a local
//! replica file synchronized with it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::backend::{Backend, RemoteBackend, SqliteBackend};
use crate::error::{GraphError, Result};
use crate::schema::{ensure_change_log, ensure_graph_schema};
use crate::sync::Replica;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Whether relation endpoints must name existing entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationPolicy {
    /// Endpoints are not checked at insert time.
    #[default]
    Loose,
    /// Creating a relation with a missing endpoint fails with `NotFound`.
    Strict,
}

impl RelationPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loose => "loose",
            Self::Strict => "strict",
        }
    }
}

impl fmt::Display for RelationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationPolicy {
    type Err = GraphError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "loose" => Ok(Self::Loose),
            "strict" => Ok(Self::Strict),
            other => Err(GraphError::InvalidData(format!(
                "unknown relation policy '{other}' (expected loose or strict)"
            ))),
        }
    }
}

/// Settings for [`ConnectionManager::connect`].
#[derive(Clone, Default)]
pub struct ConnectionConfig {
    /// Store address: `libsql://`, `https://`, `http://`, `file:<path>` or `:memory:`.
    pub url: Option<String>,
    /// Bearer token for a remote store.
    pub auth_token: Option<String>,
    /// Local replica file; enables replica mode.
    pub local_replica_path: Option<PathBuf>,
    pub relation_policy: RelationPolicy,
    /// HTTP request timeout for remote stores.
    pub timeout: Option<Duration>,
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("url", &self.url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("local_replica_path", &self.local_replica_path)
            .field("relation_policy", &self.relation_policy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ConnectionConfig {
    /// Create a config for the store at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Default::default()
        }
    }

    /// Set the auth token.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Serve from a local replica at `path`.
    pub fn with_local_replica_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.local_replica_path = Some(path.into());
        self
    }

    /// Set the relation endpoint policy.
    pub fn with_relation_policy(mut self, policy: RelationPolicy) -> Self {
        self.relation_policy = policy;
        self
    }

    /// Set the HTTP request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The connection mode these settings select.
    pub fn mode(&self) -> Mode {
        if self.local_replica_path.is_some() {
            Mode::Replica
        } else {
            Mode::Direct
        }
    }
}

/// How the handle reaches the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Reads and writes go straight to the store.
    Direct,
    /// Reads and writes go to a local file that syncs with the store.
    Replica,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct => f.write_str("direct"),
            Self::Replica => f.write_str("replica"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// A live, schema-ready connection.
#[derive(Debug)]
pub struct Handle {
    /// Serves every read and write.
    backend: Arc<dyn Backend>,
    replica: Option<Replica>,
    relation_policy: RelationPolicy,
}

impl Handle {
    /// Open the store described by `config`.
    ///
    /// In replica mode the initial sync must succeed before this returns.
    pub async fn open(config: &ConnectionConfig) -> Result<Self> {
        let url = config
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| GraphError::MissingConfig("database URL".to_string()))?;

        let remote = open_backend(url, config.auth_token.clone(), config.timeout)?;
        ensure_graph_schema(remote.as_ref()).await?;

        let Some(path) = &config.local_replica_path else {
            return Ok(Self {
                backend: remote,
                replica: None,
                relation_policy: config.relation_policy,
            });
        };

        let local = SqliteBackend::open(path)?;
        ensure_graph_schema(&local).await?;
        ensure_change_log(&local).await?;

        let replica = Replica::new(local.clone(), remote);
        replica.sync().await?;

        Ok(Self {
            backend: Arc::new(local),
            replica: Some(replica),
            relation_policy: config.relation_policy,
        })
    }

    /// The backend serving reads and writes.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// The replica, in replica mode.
    pub fn replica(&self) -> Option<&Replica> {
        self.replica.as_ref()
    }

    pub fn mode(&self) -> Mode {
        if self.replica.is_some() {
            Mode::Replica
        } else {
            Mode::Direct
        }
    }

    pub fn relation_policy(&self) -> RelationPolicy {
        self.relation_policy
    }

    /// Final sync (replica mode), then release the backends.
    async fn close(&self) -> Result<()> {
        let remote_closed = match &self.replica {
            Some(replica) => {
                if let Err(e) = replica.sync().await {
                    warn!(error = %e, "final sync failed; pending changes kept for next connect");
                }
                replica.remote().close().await
            }
            None => Ok(()),
        };
        self.backend.close().await?;
        remote_closed
    }
}

/// Open the backend for a store address.
fn open_backend(
    url: &str,
    auth_token: Option<String>,
    timeout: Option<Duration>,
) -> Result<Arc<dyn Backend>> {
    if url == ":memory:" {
        return Ok(Arc::new(SqliteBackend::open_in_memory()?));
    }
    if let Some(path) = file_url_path(url) {
        if path.as_os_str().is_empty() {
            return Err(GraphError::InvalidUrl(format!("missing path in {url}")));
        }
        return Ok(Arc::new(SqliteBackend::open(path)?));
    }
    Ok(Arc::new(RemoteBackend::connect(url, auth_token, timeout)?))
}

/// Path named by a `file:` URL.
fn file_url_path(url: &str) -> Option<&Path> {
    let rest = url.strip_prefix("file:")?;
    let rest = rest.strip_prefix("//").unwrap_or(rest);
    Some(Path::new(rest))
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Owner of the single live [`Handle`].
///
/// Shared through `Arc`; only `connect` and `teardown` take the write lock.
#[derive(Debug, Default)]
pub struct ConnectionManager {
    handle: RwLock<Option<Arc<Handle>>>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect, or return the live handle if already connected.
    pub async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<Handle>> {
        let mut slot = self.handle.write().await;
        if let Some(handle) = slot.as_ref() {
            debug!("connect called with a live handle; reusing it");
            return Ok(handle.clone());
        }

        let handle = Arc::new(Handle::open(config).await?);
        info!(
            store = %handle.backend().describe(),
            mode = %handle.mode(),
            relation_policy = %handle.relation_policy(),
            "knowledge graph store connected"
        );
        *slot = Some(handle.clone());
        Ok(handle)
    }

    /// The live handle.
    pub async fn handle(&self) -> Result<Arc<Handle>> {
        self.handle
            .read()
            .await
            .clone()
            .ok_or(GraphError::NotInitialized)
    }

    /// Release the live handle. A no-op when not connected.
    ///
    /// In replica mode a final sync is attempted first; its failure is
    /// logged and does not keep the handle alive.
    pub async fn teardown(&self) -> Result<()> {
        let Some(handle) = self.handle.write().await.take() else {
            debug!("teardown called without a live handle");
            return Ok(());
        };

        handle.close().await?;
        info!("knowledge graph store closed");
        Ok(())
    }

    pub async fn is_connected(&self) -> bool {
        self.handle.read().await.is_some()
    }

    /// Mode of the live handle.
    pub async fn mode(&self) -> Option<Mode> {
        self.handle.read().await.as_ref().map(|h| h.mode())
    }
}
