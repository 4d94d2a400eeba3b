//! Graph operations against a remote libSQL server.
//!
//! A wiremock responder speaks the Hrana v2 pipeline over a SQLite file:
//! one connection per stream, a fresh baton on every response, and errors
//! carrying primary result codes the way the server reports them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kgraph_store::backend::{Backend, RemoteBackend, Session, Statement};
use kgraph_store::{
    ConnectionConfig, Entity, GraphError, GraphStore, Mode, ObservationInput, Relation,
};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, params_from_iter};
use serde_json::{Value, json};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

// ─────────────────────────────────────────────────────────────────────────────
// Hrana server
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct Streams {
    /// Open streams by current baton.
    open: HashMap<String, (u64, Connection)>,
    next_id: u64,
    next_baton: u64,
    /// Stream id and SQL of every executed statement.
    executed: Vec<(u64, String)>,
}

#[derive(Clone)]
struct HranaServer {
    db: PathBuf,
    streams: Arc<Mutex<Streams>>,
}

impl HranaServer {
    fn executed(&self) -> Vec<(u64, String)> {
        self.streams.lock().unwrap().executed.clone()
    }

    fn open_streams(&self) -> usize {
        self.streams.lock().unwrap().open.len()
    }
}

impl Respond for HranaServer {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = match serde_json::from_slice(&request.body) {
            Ok(body) => body,
            Err(e) => return ResponseTemplate::new(400).set_body_string(e.to_string()),
        };
        let mut streams = self.streams.lock().unwrap();

        let (id, conn) = match body["baton"].as_str() {
            Some(baton) => match streams.open.remove(baton) {
                Some(stream) => stream,
                None => return ResponseTemplate::new(400).set_body_string("unknown baton"),
            },
            None => {
                streams.next_id += 1;
                let conn = Connection::open(&self.db).unwrap();
                conn.busy_timeout(Duration::from_secs(5)).unwrap();
                (streams.next_id, conn)
            }
        };

        let mut closed = false;
        let mut results = Vec::new();
        for req in body["requests"].as_array().cloned().unwrap_or_default() {
            let outcome = match req["type"].as_str() {
                Some("execute") => {
                    let sql = req["stmt"]["sql"].as_str().unwrap_or_default().to_string();
                    streams.executed.push((id, sql.clone()));
                    run_statement(&conn, &sql, &req["stmt"]["args"])
                }
                Some("sequence") => conn
                    .execute_batch(req["sql"].as_str().unwrap_or_default())
                    .map(|()| json!({"type": "sequence"})),
                Some("close") => {
                    closed = true;
                    Ok(json!({"type": "close"}))
                }
                other => {
                    return ResponseTemplate::new(400)
                        .set_body_string(format!("unsupported request {other:?}"));
                }
            };
            results.push(match outcome {
                Ok(response) => json!({"type": "ok", "response": response}),
                Err(e) => json!({"type": "error", "error": error_body(&e)}),
            });
        }

        // Dropping the connection rolls back whatever the stream left open.
        let baton = if closed {
            Value::Null
        } else {
            streams.next_baton += 1;
            let baton = format!("baton-{}", streams.next_baton);
            streams.open.insert(baton.clone(), (id, conn));
            Value::String(baton)
        };

        ResponseTemplate::new(200).set_body_json(json!({
            "baton": baton,
            "base_url": null,
            "results": results,
        }))
    }
}

fn run_statement(conn: &Connection, sql: &str, args: &Value) -> rusqlite::Result<Value> {
    let args: Vec<SqlValue> = args
        .as_array()
        .map(|args| args.iter().map(decode_value).collect())
        .unwrap_or_default();

    let mut stmt = conn.prepare(sql)?;
    let columns = stmt.column_count();
    let (rows, affected) = if columns == 0 {
        (Vec::new(), stmt.execute(params_from_iter(args))?)
    } else {
        let rows = stmt
            .query_map(params_from_iter(args), |row| {
                (0..columns)
                    .map(|i| row.get::<_, SqlValue>(i).map(|v| encode_value(&v)))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        (rows, 0)
    };

    Ok(json!({
        "type": "execute",
        "result": {
            "cols": [],
            "rows": rows,
            "affected_row_count": affected,
            "last_insert_rowid": null,
        }
    }))
}

fn decode_value(value: &Value) -> SqlValue {
    match value["type"].as_str() {
        Some("integer") => value["value"]
            .as_str()
            .and_then(|v| v.parse().ok())
            .map_or(SqlValue::Null, SqlValue::Integer),
        Some("float") => value["value"].as_f64().map_or(SqlValue::Null, SqlValue::Real),
        Some("text") => value["value"]
            .as_str()
            .map_or(SqlValue::Null, |v| SqlValue::Text(v.to_string())),
        _ => SqlValue::Null,
    }
}

fn encode_value(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null | SqlValue::Blob(_) => json!({"type": "null"}),
        SqlValue::Integer(i) => json!({"type": "integer", "value": i.to_string()}),
        SqlValue::Real(f) => json!({"type": "float", "value": f}),
        SqlValue::Text(s) => json!({"type": "text", "value": s}),
    }
}

/// Primary result code only, as the server reports it.
fn error_body(err: &rusqlite::Error) -> Value {
    let code = match err.sqlite_error_code() {
        Some(rusqlite::ErrorCode::ConstraintViolation) => "SQLITE_CONSTRAINT",
        Some(rusqlite::ErrorCode::DatabaseBusy) => "SQLITE_BUSY",
        _ => "SQLITE_ERROR",
    };
    json!({"message": format!("SQLite error: {err}"), "code": code})
}

async fn start_server(dir: &Path) -> (MockServer, HranaServer) {
    let hrana = HranaServer {
        db: dir.join("remote.db"),
        streams: Arc::default(),
    };
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/pipeline"))
        .respond_with(hrana.clone())
        .mount(&server)
        .await;
    (server, hrana)
}

async fn wait_for_streams_closed(hrana: &HranaServer) {
    for _ in 0..100 {
        if hrana.open_streams() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("{} stream(s) still open", hrana.open_streams());
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_transaction_stays_on_one_stream() {
    let dir = TempDir::new().unwrap();
    let (server, hrana) = start_server(dir.path()).await;

    let store = GraphStore::connect(&ConnectionConfig::new(server.uri()))
        .await
        .unwrap();
    assert_eq!(store.manager().mode().await, Some(Mode::Direct));

    let created = store
        .create_entities(vec![Entity::new("Alice", "person").with_observation("likes tea")])
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(hrana.open_streams(), 0);

    let executed = hrana.executed();
    let (begin_stream, _) = executed
        .iter()
        .find(|(_, sql)| sql == "BEGIN IMMEDIATE")
        .unwrap();
    let stream: Vec<&str> = executed
        .iter()
        .filter(|(id, _)| id == begin_stream)
        .map(|(_, sql)| sql.as_str())
        .collect();
    assert_eq!(stream.first(), Some(&"BEGIN IMMEDIATE"));
    assert_eq!(stream.last(), Some(&"COMMIT"));
    assert!(stream.iter().any(|sql| sql.starts_with("INSERT INTO entities")));
    assert!(stream.iter().any(|sql| sql.starts_with("INSERT INTO observations")));

    let graph = store.read_graph().await.unwrap();
    assert_eq!(
        graph.entities,
        vec![Entity::new("Alice", "person").with_observation("likes tea")]
    );

    store.manager().teardown().await.unwrap();
}

#[tokio::test]
async fn test_duplicates_are_skipped_on_remote() {
    let dir = TempDir::new().unwrap();
    let (server, _hrana) = start_server(dir.path()).await;
    let store = GraphStore::connect(&ConnectionConfig::new(server.uri()))
        .await
        .unwrap();

    store
        .create_entities(vec![Entity::new("Alice", "person").with_observation("likes tea")])
        .await
        .unwrap();

    let again = store
        .create_entities(vec![Entity::new("Alice", "robot")])
        .await
        .unwrap();
    assert!(again.is_empty());

    let mixed = store
        .create_entities(vec![Entity::new("Alice", "robot"), Entity::new("Bob", "person")])
        .await
        .unwrap();
    assert_eq!(mixed, vec![Entity::new("Bob", "person")]);

    let added = store
        .add_observations(vec![ObservationInput::new(
            "Alice",
            ["likes tea", "reads books"],
        )])
        .await
        .unwrap();
    assert_eq!(added[0].added_observations, vec!["reads books"]);

    let knows = Relation::new("Alice", "Bob", "knows");
    assert_eq!(
        store.create_relations(vec![knows.clone()]).await.unwrap(),
        vec![knows.clone()]
    );
    assert!(store
        .create_relations(vec![knows.clone()])
        .await
        .unwrap()
        .is_empty());

    let graph = store.read_graph().await.unwrap();
    assert_eq!(
        graph.entities[0],
        Entity::new("Alice", "person")
            .with_observation("likes tea")
            .with_observation("reads books")
    );
    assert_eq!(graph.relations, vec![knows]);

    store.manager().teardown().await.unwrap();
}

#[tokio::test]
async fn test_plain_duplicate_insert_reports_primary_code() {
    let dir = TempDir::new().unwrap();
    let (server, _hrana) = start_server(dir.path()).await;
    let backend = RemoteBackend::connect(&server.uri(), None, None).unwrap();
    backend
        .execute_script("CREATE TABLE t (v TEXT UNIQUE)")
        .await
        .unwrap();

    let mut session = backend.session().await.unwrap();
    session
        .execute(Statement::new("INSERT INTO t (v) VALUES (?)").bind("a"))
        .await
        .unwrap();
    let err = session
        .execute(Statement::new("INSERT INTO t (v) VALUES (?)").bind("a"))
        .await
        .unwrap_err();
    match &err {
        GraphError::Remote { code, .. } => assert_eq!(code.as_deref(), Some("SQLITE_CONSTRAINT")),
        other => panic!("unexpected error: {other:?}"),
    }

    // The stream survives a failed statement.
    let skipped = session
        .execute(Statement::new("INSERT INTO t (v) VALUES (?) ON CONFLICT DO NOTHING").bind("a"))
        .await
        .unwrap();
    assert_eq!(skipped, 0);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_dropped_session_rolls_back() {
    let dir = TempDir::new().unwrap();
    let (server, hrana) = start_server(dir.path()).await;
    let backend = RemoteBackend::connect(&server.uri(), None, None).unwrap();
    backend
        .execute_script("CREATE TABLE t (v TEXT)")
        .await
        .unwrap();

    {
        let mut session = backend.session().await.unwrap();
        session.begin().await.unwrap();
        session
            .execute(Statement::new("INSERT INTO t (v) VALUES (?)").bind("a"))
            .await
            .unwrap();
        assert_eq!(hrana.open_streams(), 1);
    }
    wait_for_streams_closed(&hrana).await;

    let mut session = backend.session().await.unwrap();
    let rows = session
        .query(Statement::new("SELECT COUNT(*) FROM t"))
        .await
        .unwrap();
    assert_eq!(rows[0].integer(0).unwrap(), 0);
    session.close().await.unwrap();
}
