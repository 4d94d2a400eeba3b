//! Hrana-over-HTTP wire types (libSQL remote protocol, v2 pipeline).
//!
//! A pipeline request carries an optional stream `baton` and a list of
//! stream requests; the response carries the next baton and one result per
//! request.

use serde::{Deserialize, Serialize};

use super::{Row, Statement, Value};
use crate::error::{GraphError, Result, is_unique_violation_code};

/// Path of the pipeline endpoint relative to the server URL.
pub const PIPELINE_PATH: &str = "v2/pipeline";

// ─────────────────────────────────────────────────────────────────────────────
// Requests
// ─────────────────────────────────────────────────────────────────────────────

/// Body of `POST /v2/pipeline`.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRequest {
    pub baton: Option<String>,
    pub requests: Vec<StreamRequest>,
}

/// One request executed on the stream.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRequest {
    /// Execute a single statement.
    Execute { stmt: HranaStmt },
    /// Execute a `;`-separated script without parameters.
    Sequence { sql: String },
    /// Close the stream, discarding any open transaction.
    Close,
}

/// A statement in wire form.
#[derive(Debug, Clone, Serialize)]
pub struct HranaStmt {
    pub sql: String,
    pub args: Vec<HranaValue>,
    pub want_rows: bool,
}

impl HranaStmt {
    pub fn from_statement(stmt: Statement, want_rows: bool) -> Self {
        Self {
            sql: stmt.sql,
            args: stmt.args.into_iter().map(HranaValue::from).collect(),
            want_rows,
        }
    }
}

/// A value in wire form. Integers travel as strings to keep 64-bit precision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HranaValue {
    Null,
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { base64: String },
}

impl From<Value> for HranaValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => HranaValue::Null,
            Value::Integer(i) => HranaValue::Integer {
                value: i.to_string(),
            },
            Value::Real(f) => HranaValue::Float { value: f },
            Value::Text(s) => HranaValue::Text { value: s },
        }
    }
}

impl TryFrom<HranaValue> for Value {
    type Error = GraphError;

    fn try_from(value: HranaValue) -> Result<Self> {
        Ok(match value {
            HranaValue::Null => Value::Null,
            HranaValue::Integer { value } => Value::Integer(value.parse().map_err(|e| {
                GraphError::protocol(format!("invalid integer '{value}': {e}"))
            })?),
            HranaValue::Float { value } => Value::Real(value),
            HranaValue::Text { value } => Value::Text(value),
            // Graph tables hold no blobs; surface the raw encoding.
            HranaValue::Blob { base64 } => Value::Text(base64),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Responses
// ─────────────────────────────────────────────────────────────────────────────

/// Body returned by `POST /v2/pipeline`.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineResponse {
    pub baton: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub results: Vec<StreamResult>,
}

/// Outcome of one stream request.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: HranaError },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamResponse {
    Execute { result: StmtResult },
    Sequence,
    Close,
}

/// Result of an executed statement.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StmtResult {
    #[serde(default)]
    pub rows: Vec<Vec<HranaValue>>,
    #[serde(default)]
    pub affected_row_count: u64,
}

impl StmtResult {
    pub fn into_rows(self) -> Result<Vec<Row>> {
        self.rows
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(Value::try_from)
                    .collect::<Result<Vec<_>>>()
                    .map(Row)
            })
            .collect()
    }
}

/// Error reported for a single stream request.
#[derive(Debug, Clone, Deserialize)]
pub struct HranaError {
    pub message: String,
    #[serde(default)]
    pub code: Option<String>,
}

impl From<HranaError> for GraphError {
    fn from(err: HranaError) -> Self {
        match err.code.as_deref() {
            Some(code) if is_unique_violation_code(code) => {
                GraphError::ConstraintConflict(err.message)
            }
            _ => GraphError::Remote {
                code: err.code,
                message: err.message,
            },
        }
    }
}

impl StreamResult {
    /// Unwrap an `execute` result.
    pub fn into_execute(self) -> Result<StmtResult> {
        match self {
            StreamResult::Ok {
                response: StreamResponse::Execute { result },
            } => Ok(result),
            StreamResult::Ok { response } => Err(GraphError::protocol(format!(
                "expected execute response, got {response:?}"
            ))),
            StreamResult::Error { error } => Err(error.into()),
        }
    }

    /// Check a result whose payload is not needed.
    pub fn into_unit(self) -> Result<()> {
        match self {
            StreamResult::Ok { .. } => Ok(()),
            StreamResult::Error { error } => Err(error.into()),
        }
    }
}
