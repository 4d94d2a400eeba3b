//! Configuration types.
//!
//! ```toml
//! [database]
//! url = "libsql://my-db.turso.io"
//! local_replica_path = "/var/lib/kgraph/replica.db"
//! relation_policy = "loose"   # or "strict"
//! timeout_secs = 30
//!
//! [logging]
//! file = true
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

// ─────────────────────────────────────────────────────────────────────────────
// Root Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KgraphConfig {
    /// Store connection settings.
    pub database: Option<DatabaseConfig>,

    /// Log output settings.
    pub logging: Option<LoggingConfig>,
}

impl KgraphConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// `[database]` merges field by field, so a project file can override
    /// just the URL of a user-level config.
    pub fn merge(&mut self, other: KgraphConfig) {
        if let Some(over) = other.database {
            match self.database.as_mut() {
                Some(base) => base.merge(over),
                None => self.database = Some(over),
            }
        }

        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// The `[database]` section, or defaults.
    pub fn database(&self) -> DatabaseConfig {
        self.database.clone().unwrap_or_default()
    }

    /// The `[logging]` section, or defaults.
    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Database Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Whether relation endpoints must name existing entities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationPolicy {
    #[default]
    Loose,
    Strict,
}

impl RelationPolicy {
    /// The name used in config files.
    pub fn as_str(self) -> &'static str {
        match self {
            RelationPolicy::Loose => "loose",
            RelationPolicy::Strict => "strict",
        }
    }
}

impl std::fmt::Display for RelationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store connection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Store address (`libsql://`, `https://`, `http://`, `file:` or `:memory:`).
    pub url: Option<String>,
    /// Auth token. Prefer the keyring or `TURSO_AUTH_TOKEN`.
    pub auth_token: Option<String>,
    /// Local replica file; enables replica mode.
    pub local_replica_path: Option<PathBuf>,
    pub relation_policy: Option<RelationPolicy>,
    /// HTTP request timeout for remote stores.
    pub timeout_secs: Option<u64>,
}

impl DatabaseConfig {
    /// Overlay set fields of `other`.
    pub fn merge(&mut self, other: DatabaseConfig) {
        if other.url.is_some() {
            self.url = other.url;
        }
        if other.auth_token.is_some() {
            self.auth_token = other.auth_token;
        }
        if other.local_replica_path.is_some() {
            self.local_replica_path = other.local_replica_path;
        }
        if other.relation_policy.is_some() {
            self.relation_policy = other.relation_policy;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
    }

    /// Whether the auth token is stored in plaintext in a config file.
    pub fn has_plaintext_auth_token(&self) -> bool {
        self.auth_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    pub fn relation_policy(&self) -> RelationPolicy {
        self.relation_policy.unwrap_or_default()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Log output settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Whether to also write JSON logs to a daily rolling file.
    pub file: bool,
    /// Directory for log files. Defaults to `<config dir>/logs`.
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: true,
            dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let config = KgraphConfig::from_toml(
            r#"
[database]
url = "libsql://my-db.turso.io"
local_replica_path = "/tmp/replica.db"
relation_policy = "strict"
timeout_secs = 30

[logging]
file = false
"#,
        )
        .unwrap();

        let db = config.database();
        assert_eq!(db.url.as_deref(), Some("libsql://my-db.turso.io"));
        assert_eq!(db.local_replica_path, Some(PathBuf::from("/tmp/replica.db")));
        assert_eq!(db.relation_policy(), RelationPolicy::Strict);
        assert_eq!(db.timeout(), Some(Duration::from_secs(30)));
        assert!(!config.logging().file);
    }

    #[test]
    fn test_relation_policy_names_match_config_values() {
        for policy in [RelationPolicy::Loose, RelationPolicy::Strict] {
            let config =
                KgraphConfig::from_toml(&format!("[database]\nrelation_policy = \"{policy}\"\n"))
                    .unwrap();
            assert_eq!(config.database().relation_policy(), policy);
        }
    }

    #[test]
    fn test_defaults() {
        let config = KgraphConfig::from_toml("").unwrap();
        assert!(config.database.is_none());
        assert_eq!(config.database().relation_policy(), RelationPolicy::Loose);
        assert!(config.logging().file);
    }

    #[test]
    fn test_unknown_policy_is_parse_error() {
        let err = KgraphConfig::from_toml(
            r#"
[database]
relation_policy = "sometimes"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, crate::ConfigError::Parse(_)));
    }

    #[test]
    fn test_database_merges_field_by_field() {
        let mut base = KgraphConfig::from_toml(
            r#"
[database]
url = "libsql://base.turso.io"
relation_policy = "strict"
"#,
        )
        .unwrap();
        let over = KgraphConfig::from_toml(
            r#"
[database]
url = "file:/tmp/local.db"
"#,
        )
        .unwrap();

        base.merge(over);
        let db = base.database();
        assert_eq!(db.url.as_deref(), Some("file:/tmp/local.db"));
        assert_eq!(db.relation_policy(), RelationPolicy::Strict);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = KgraphConfig {
            database: Some(DatabaseConfig {
                url: Some(":memory:".to_string()),
                ..Default::default()
            }),
            logging: None,
        };
        let parsed = KgraphConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
