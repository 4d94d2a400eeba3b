//! Knowledge graph storage for kgraph.
//!
//! Persists named entities carrying free-text observations, and typed
//! directed relations between them, in SQLite or a remote libSQL server.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  GraphStore          create/delete/search/read over one transaction     │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │  ConnectionManager   single live Handle, schema on connect              │
//! ├──────────────────────────────────┬──────────────────────────────────────┤
//! │  direct: Backend                 │  replica: local SqliteBackend        │
//! │  (SQLite file or libSQL/Hrana)   │  + change log + Replica::sync()      │
//! └──────────────────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use kgraph_store::{ConnectionConfig, Entity, GraphStore, ObservationInput, Relation};
//!
//! # async fn run() -> kgraph_store::Result<()> {
//! let store = GraphStore::connect(
//!     &ConnectionConfig::new("libsql://my-db.turso.io").with_auth_token("token"),
//! )
//! .await?;
//!
//! store
//!     .create_entities(vec![Entity::new("Alice", "person").with_observation("likes tea")])
//!     .await?;
//! store
//!     .create_relations(vec![Relation::new("Alice", "Bob", "knows")])
//!     .await?;
//! store
//!     .add_observations(vec![ObservationInput::new("Alice", ["speaks French"])])
//!     .await?;
//!
//! let graph = store.search_nodes("tea").await?;
//! assert_eq!(graph.entities[0].name, "Alice");
//!
//! store.manager().teardown().await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod connection;
pub mod error;
pub mod schema;
pub mod store;
pub mod sync;
pub mod types;
pub mod validation;

pub use connection::{ConnectionConfig, ConnectionManager, Handle, Mode, RelationPolicy};
pub use error::{GraphError, Result};
pub use store::GraphStore;
pub use sync::{Change, Replica, SyncReport};
pub use types::{
    Entity, GraphStats, KnowledgeGraph, ObservationDeletion, ObservationInput, ObservationResult,
    Relation,
};
