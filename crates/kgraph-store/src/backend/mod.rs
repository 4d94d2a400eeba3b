//! SQL backends the graph store runs on.
//!
//! A [`Backend`] hands out [`Session`]s. A session is one connection scope:
//! a locked local SQLite connection, or one Hrana stream on a remote libSQL
//! server. Transactions live inside a session and are rolled back when a
//! session is dropped with a transaction still open.

mod hrana;
mod remote;
mod sqlite;

use async_trait::async_trait;

use crate::error::{GraphError, Result};

pub use remote::RemoteBackend;
pub use sqlite::SqliteBackend;

// ─────────────────────────────────────────────────────────────────────────────
// Values and Statements
// ─────────────────────────────────────────────────────────────────────────────

/// A single SQL value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Borrow the value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// The value as an integer, if it is one.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

/// A result row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(pub Vec<Value>);

impl Row {
    /// Read column `idx` as text.
    pub fn text(&self, idx: usize) -> Result<String> {
        match self.0.get(idx) {
            Some(Value::Text(s)) => Ok(s.clone()),
            Some(other) => Err(GraphError::protocol(format!(
                "column {idx}: expected text, got {other:?}"
            ))),
            None => Err(GraphError::protocol(format!("column {idx} out of range"))),
        }
    }

    /// Read column `idx` as an integer.
    pub fn integer(&self, idx: usize) -> Result<i64> {
        match self.0.get(idx) {
            Some(Value::Integer(i)) => Ok(*i),
            Some(other) => Err(GraphError::protocol(format!(
                "column {idx}: expected integer, got {other:?}"
            ))),
            None => Err(GraphError::protocol(format!("column {idx} out of range"))),
        }
    }
}

/// A SQL statement with positional `?` parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub args: Vec<Value>,
}

impl Statement {
    /// A statement without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            args: Vec::new(),
        }
    }

    /// A statement with parameters.
    pub fn with_args<I, V>(sql: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self {
            sql: sql.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Bind one more parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }
}

/// Build `?, ?, ?` for `count` parameters.
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// A store that hands out sessions.
///
/// Implementations must be `Send + Sync` so a single handle can be shared
/// by every caller in the process.
#[async_trait]
pub trait Backend: Send + Sync + std::fmt::Debug {
    /// Open a session.
    async fn session(&self) -> Result<Box<dyn Session>>;

    /// Run a script of `;`-separated statements (schema DDL).
    async fn execute_script(&self, sql: &str) -> Result<()>;

    /// Release the backend's resources. Later calls may fail.
    async fn close(&self) -> Result<()>;

    /// Short description for logs (never includes credentials).
    fn describe(&self) -> String;
}

/// One connection scope on a backend.
#[async_trait]
pub trait Session: Send {
    /// Execute a statement and return the number of affected rows.
    ///
    /// UNIQUE/PRIMARY KEY violations reported with an extended code surface
    /// as [`GraphError::ConstraintConflict`]; the surrounding transaction
    /// stays usable afterwards.
    async fn execute(&mut self, stmt: Statement) -> Result<u64>;

    /// Run a query and collect every row.
    async fn query(&mut self, stmt: Statement) -> Result<Vec<Row>>;

    /// Open a transaction.
    async fn begin(&mut self) -> Result<()>;

    /// Commit the open transaction.
    async fn commit(&mut self) -> Result<()>;

    /// Roll back the open transaction.
    async fn rollback(&mut self) -> Result<()>;

    /// End the session. Any open transaction is rolled back.
    async fn close(self: Box<Self>) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_builder() {
        let stmt = Statement::new("SELECT ?, ?").bind("a").bind(1i64);
        assert_eq!(stmt.args, vec![Value::Text("a".into()), Value::Integer(1)]);

        let stmt = Statement::with_args("SELECT ?", ["x"]);
        assert_eq!(stmt.args, vec![Value::Text("x".into())]);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }

    #[test]
    fn test_row_accessors() {
        let row = Row(vec![Value::Text("a".into()), Value::Integer(7)]);
        assert_eq!(row.text(0).unwrap(), "a");
        assert_eq!(row.integer(1).unwrap(), 7);
        assert!(row.text(1).is_err());
        assert!(row.integer(5).is_err());
    }
}
