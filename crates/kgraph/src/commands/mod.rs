//! CLI command handlers.

pub mod config;
pub mod export;
pub mod graph;
pub mod import;
pub mod serve;
pub mod sync;

use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context as _, Result};
use serde::Serialize;
use tracing::debug;

use kgraph_config::{LoadedConfig, resolve_auth_token};
use kgraph_store::{ConnectionConfig, GraphStore, RelationPolicy};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Store wrapper; connected lazily by the commands that need it.
    pub store: GraphStore,
    /// Merged configuration files and environment.
    pub loaded: LoadedConfig,
    /// `--url` override.
    pub url: Option<String>,
    /// `--auth-token` override.
    pub auth_token: Option<String>,
    /// `--replica` override.
    pub replica: Option<PathBuf>,
    /// User config directory (`--config-dir` or the platform default).
    pub config_dir: Option<PathBuf>,
    /// Print single-line JSON.
    pub compact: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Settings for the store: CLI flags over environment over config files.
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let db = self.loaded.config.database();
        let auth_token = self.auth_token.clone().or_else(|| {
            resolve_auth_token(db.auth_token.as_deref()).map(|secret| {
                debug!(source = %secret.source, "resolved auth token");
                secret.value
            })
        });

        let relation_policy: RelationPolicy = db.relation_policy().as_str().parse()?;

        Ok(ConnectionConfig {
            url: self.url.clone().or_else(|| db.url.clone()),
            auth_token,
            local_replica_path: self
                .replica
                .clone()
                .or_else(|| db.local_replica_path.clone()),
            relation_policy,
            timeout: db.timeout(),
        })
    }

    /// Connect (once) and return the store.
    pub async fn connect(&self) -> Result<&GraphStore> {
        let config = self.connection_config()?;
        debug!(?config, "connecting");
        self.store.manager().connect(&config).await?;
        Ok(&self.store)
    }

    /// Print a value as JSON on stdout.
    pub fn print_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<()> {
        println!("{}", to_json(value, self.compact)?);
        Ok(())
    }
}

/// Serialize pretty or compact.
pub fn to_json<T: Serialize + ?Sized>(value: &T, compact: bool) -> Result<String> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    Ok(json)
}

/// Read a JSON argument: inline text, `@path` for a file, or `-` for stdin.
pub fn read_input(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read stdin")?;
        return Ok(buf);
    }
    if let Some(path) = arg.strip_prefix('@') {
        return std::fs::read_to_string(path)
            .with_context(|| format!("failed to read input file '{}'", path));
    }
    Ok(arg.to_string())
}

/// Parse a JSON argument (see [`read_input`]).
pub fn parse_input(arg: &str) -> Result<serde_json::Value> {
    let text = read_input(arg)?;
    serde_json::from_str(&text).context("input is not valid JSON")
}
