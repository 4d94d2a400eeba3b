//! Serve command - newline-delimited JSON requests on stdin.
//!
//! Each input line is `{"id": ..., "op": "create_entities", "args": {...}}`.
//! Each output line is `{"id": ..., "ok": true, "result": ...}` or
//! `{"id": ..., "ok": false, "error": {"kind": ..., "message": ...}}`.
//! The loop ends at EOF; the process also stops on SIGINT / SIGTERM.

use anyhow::Result;
use clap::Args;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info};

use kgraph_store::GraphStore;

use super::Context;
use crate::ops::{Operation, RequestError};

/// Arguments for the serve command.
#[derive(Args, Debug)]
pub struct ServeArgs {}

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Value,
    op: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
struct Response {
    id: Value,
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
}

impl Response {
    fn success(id: Value, result: Value) -> Self {
        Self {
            id,
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Value, kind: &'static str, message: String) -> Self {
        Self {
            id,
            ok: false,
            result: None,
            error: Some(ErrorBody { kind, message }),
        }
    }
}

/// Run the serve command.
pub async fn run(_args: ServeArgs, ctx: &Context) -> Result<()> {
    let store = ctx.connect().await?;
    info!("serving requests on stdin");

    let served = serve(
        store,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await?;

    info!(requests = served, "stdin closed");
    Ok(())
}

/// Answer requests from `reader` until EOF. Returns the number handled.
async fn serve<R, W>(store: &GraphStore, reader: R, mut writer: W) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut served = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = handle_line(store, &line).await;
        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
        served += 1;
    }
    Ok(served)
}

async fn handle_line(store: &GraphStore, line: &str) -> Response {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            return Response::failure(
                Value::Null,
                "InvalidRequest",
                format!("malformed request: {e}"),
            );
        }
    };

    let Request { id, op, args } = request;
    match run_operation(store, &op, args).await {
        Ok(result) => Response::success(id, result),
        Err(e) => {
            debug!(op = %op, kind = e.kind(), error = %e, "request failed");
            Response::failure(id, e.kind(), e.to_string())
        }
    }
}

async fn run_operation(
    store: &GraphStore,
    op: &str,
    args: Value,
) -> std::result::Result<Value, RequestError> {
    Operation::parse(op, args)?.execute(store).await
}
