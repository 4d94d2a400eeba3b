//! Remote libSQL backend over the Hrana HTTP pipeline.
//!
//! Every session is one server-side stream. The first request opens the
//! stream; the returned baton threads the following requests onto it, which
//! is what lets `BEGIN` ... `COMMIT` span several HTTP round trips.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, trace, warn};

use super::hrana::{
    HranaStmt, PIPELINE_PATH, PipelineRequest, PipelineResponse, StreamRequest, StreamResult,
};
use super::{Backend, Row, Session, Statement};
use crate::error::{GraphError, Result};

/// Shared HTTP state of a remote backend.
#[derive(Debug)]
struct RemoteInner {
    client: reqwest::Client,
    /// Base URL, always `http(s)://host[:port]` without trailing slash.
    url: String,
    auth_token: Option<String>,
}

impl RemoteInner {
    /// Send one pipeline request.
    async fn pipeline(
        &self,
        base_url: Option<&str>,
        request: &PipelineRequest,
    ) -> Result<PipelineResponse> {
        let endpoint = format!("{}/{}", base_url.unwrap_or(&self.url), PIPELINE_PATH);

        trace!(endpoint = %endpoint, requests = request.requests.len(), "sending pipeline request");

        let mut req = self.client.post(&endpoint).json(request);
        if let Some(token) = &self.auth_token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| GraphError::transport(format!("HTTP request failed: {}", e)))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(GraphError::transport(format!(
                "HTTP error {}: {}",
                status, body
            )));
        }

        let response: PipelineResponse = resp
            .json()
            .await
            .map_err(|e| GraphError::protocol(format!("invalid pipeline response: {}", e)))?;

        if response.results.len() != request.requests.len() {
            return Err(GraphError::protocol(format!(
                "expected {} results, got {}",
                request.requests.len(),
                response.results.len()
            )));
        }

        Ok(response)
    }
}

/// A remote libSQL database (e.g. Turso) reached over HTTP.
#[derive(Debug, Clone)]
pub struct RemoteBackend {
    inner: Arc<RemoteInner>,
}

impl RemoteBackend {
    /// Connect to the server at `url`.
    ///
    /// `libsql://` and `wss://` URLs are mapped to `https://`, `ws://` to
    /// `http://`. No request is sent until the first session is used.
    pub fn connect(
        url: &str,
        auth_token: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let url = normalize_url(url)?;

        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(5)
            .tcp_keepalive(Duration::from_secs(30));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| GraphError::transport(format!("failed to build HTTP client: {}", e)))?;

        info!(url = %url, "created remote libSQL backend");

        Ok(Self {
            inner: Arc::new(RemoteInner {
                client,
                url,
                auth_token: auth_token.filter(|t| !t.is_empty()),
            }),
        })
    }

    /// Base URL requests are sent to.
    pub fn url(&self) -> &str {
        &self.inner.url
    }
}

/// Rewrite a libSQL URL into the HTTP base URL of its pipeline endpoint.
pub(crate) fn normalize_url(raw: &str) -> Result<String> {
    let mut parsed =
        url::Url::parse(raw).map_err(|e| GraphError::InvalidUrl(format!("{raw}: {e}")))?;

    let scheme = match parsed.scheme() {
        "libsql" | "https" | "wss" => "https",
        "http" | "ws" => "http",
        other => {
            return Err(GraphError::InvalidUrl(format!(
                "unsupported scheme '{other}' in {raw}"
            )));
        }
    };
    if parsed.host_str().is_none() {
        return Err(GraphError::InvalidUrl(format!("missing host in {raw}")));
    }
    // `set_scheme` refuses special <-> non-special switches, so rebuild.
    if parsed.scheme() != scheme {
        let rest = &parsed.as_str()[parsed.scheme().len()..];
        parsed = url::Url::parse(&format!("{scheme}{rest}"))
            .map_err(|e| GraphError::InvalidUrl(format!("{raw}: {e}")))?;
    }
    parsed.set_query(None);
    parsed.set_fragment(None);

    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

#[async_trait]
impl Backend for RemoteBackend {
    async fn session(&self) -> Result<Box<dyn Session>> {
        Ok(Box::new(RemoteSession {
            inner: self.inner.clone(),
            baton: None,
            base_url: None,
        }))
    }

    async fn execute_script(&self, sql: &str) -> Result<()> {
        let request = PipelineRequest {
            baton: None,
            requests: vec![
                StreamRequest::Sequence {
                    sql: sql.to_string(),
                },
                StreamRequest::Close,
            ],
        };
        let response = self.inner.pipeline(None, &request).await?;
        let mut results = response.results.into_iter();
        if let Some(result) = results.next() {
            result.into_unit()?;
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        debug!(url = %self.inner.url, "remote backend closed");
        Ok(())
    }

    fn describe(&self) -> String {
        self.inner.url.clone()
    }
}

/// A Hrana stream.
struct RemoteSession {
    inner: Arc<RemoteInner>,
    /// Present while the server keeps the stream open.
    baton: Option<String>,
    base_url: Option<String>,
}

impl RemoteSession {
    async fn send(&mut self, request: StreamRequest) -> Result<StreamResult> {
        let request = PipelineRequest {
            baton: self.baton.take(),
            requests: vec![request],
        };
        let response = self
            .inner
            .pipeline(self.base_url.as_deref(), &request)
            .await?;

        self.baton = response.baton;
        if let Some(base_url) = response.base_url {
            self.base_url = Some(base_url.trim_end_matches('/').to_string());
        }

        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::protocol("empty pipeline response"))
    }

    async fn execute_sql(&mut self, stmt: Statement, want_rows: bool) -> Result<super::hrana::StmtResult> {
        let result = self
            .send(StreamRequest::Execute {
                stmt: HranaStmt::from_statement(stmt, want_rows),
            })
            .await?;
        result.into_execute()
    }
}

#[async_trait]
impl Session for RemoteSession {
    async fn execute(&mut self, stmt: Statement) -> Result<u64> {
        Ok(self.execute_sql(stmt, false).await?.affected_row_count)
    }

    async fn query(&mut self, stmt: Statement) -> Result<Vec<Row>> {
        self.execute_sql(stmt, true).await?.into_rows()
    }

    async fn begin(&mut self) -> Result<()> {
        self.execute_sql(Statement::new("BEGIN IMMEDIATE"), false)
            .await
            .map(|_| ())
    }

    async fn commit(&mut self) -> Result<()> {
        self.execute_sql(Statement::new("COMMIT"), false)
            .await
            .map(|_| ())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.execute_sql(Statement::new("ROLLBACK"), false)
            .await
            .map(|_| ())
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        if self.baton.is_some() {
            self.send(StreamRequest::Close).await?.into_unit()?;
        }
        self.baton = None;
        Ok(())
    }
}

impl Drop for RemoteSession {
    fn drop(&mut self) {
        // Closing the stream discards any transaction still open on it.
        let Some(baton) = self.baton.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner = self.inner.clone();
        let base_url = self.base_url.take();
        handle.spawn(async move {
            let request = PipelineRequest {
                baton: Some(baton),
                requests: vec![StreamRequest::Close],
            };
            if let Err(e) = inner.pipeline(base_url.as_deref(), &request).await {
                warn!(error = %e, "failed to close remote stream");
            }
        });
    }
}
