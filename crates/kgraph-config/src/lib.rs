//! Configuration for the kgraph knowledge graph store.
//!
//! Provides TOML-based configuration with:
//! - Config file layering (XDG user config + project-local overrides)
//! - `TURSO_*` environment variable overrides
//! - Auth token resolution (keyring → env var → config file)

pub mod discovery;
pub mod error;
pub mod secrets;
pub mod types;

pub use discovery::{
    AUTH_TOKEN_ENV, ConfigSource, DATABASE_URL_ENV, LOCAL_REPLICA_PATH_ENV, LoadedConfig,
    load_config, load_config_file, load_config_with_env, load_config_with_options,
    project_config_path, xdg_config_dir, xdg_config_path,
};
pub use error::{ConfigError, Result};
pub use secrets::{ResolvedSecret, SecretSource, resolve_auth_token};
pub use types::{DatabaseConfig, KgraphConfig, LoggingConfig, RelationPolicy};
