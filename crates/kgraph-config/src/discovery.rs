//! Config file discovery and layered merging.
//!
//! Resolution order (later overrides earlier):
//! 1. `~/.config/kgraph/config.toml` (XDG user config)
//! 2. `./kgraph.toml` (project-local)
//! 3. `TURSO_DATABASE_URL` / `TURSO_LOCAL_REPLICA_PATH` environment variables
//! 4. CLI arguments (handled externally)
//!
//! The auth token is resolved separately, see [`crate::secrets`].

use std::path::{Path, PathBuf};

use crate::{ConfigError, DatabaseConfig, KgraphConfig, Result};

/// Default config filename for project-local config.
const PROJECT_CONFIG_FILE: &str = "kgraph.toml";

/// Default config filename within XDG config directory.
const USER_CONFIG_FILE: &str = "config.toml";

/// Application name for XDG directory resolution.
const APP_NAME: &str = "kgraph";

/// Environment variable to override the config directory.
const CONFIG_DIR_ENV: &str = "KGRAPH_CONFIG_DIR";

/// Store address.
pub const DATABASE_URL_ENV: &str = "TURSO_DATABASE_URL";

/// Auth token for a remote store.
pub const AUTH_TOKEN_ENV: &str = "TURSO_AUTH_TOKEN";

/// Local replica file.
pub const LOCAL_REPLICA_PATH_ENV: &str = "TURSO_LOCAL_REPLICA_PATH";

/// Tracks where each config layer was loaded from.
#[derive(Debug, Clone)]
pub struct ConfigSource {
    /// Path to the config file.
    pub path: PathBuf,
    /// Whether the file was found and loaded.
    pub loaded: bool,
}

/// Result of config discovery and loading.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The merged configuration.
    pub config: KgraphConfig,
    /// Sources that were checked, in order of precedence (lowest first).
    pub sources: Vec<ConfigSource>,
    /// Environment variables that overrode file values.
    pub env_overrides: Vec<&'static str>,
    /// Warnings generated during loading (e.g., plaintext auth tokens).
    pub warnings: Vec<String>,
}

impl LoadedConfig {
    /// Get paths of sources that were actually loaded.
    pub fn loaded_from(&self) -> Vec<&Path> {
        self.sources
            .iter()
            .filter(|s| s.loaded)
            .map(|s| s.path.as_path())
            .collect()
    }
}

/// Load configuration by discovering and merging all config layers.
pub fn load_config(project_dir: Option<&Path>) -> Result<LoadedConfig> {
    load_config_with_options(project_dir, None)
}

/// Load configuration with explicit control over the user config directory.
///
/// `config_dir` overrides both `KGRAPH_CONFIG_DIR` and the platform default.
pub fn load_config_with_options(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
) -> Result<LoadedConfig> {
    load_config_with_env(project_dir, config_dir, |key| std::env::var(key).ok())
}

/// Load configuration reading environment variables through `env`.
pub fn load_config_with_env<F>(
    project_dir: Option<&Path>,
    config_dir: Option<&Path>,
    env: F,
) -> Result<LoadedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = KgraphConfig::new();
    let mut sources = Vec::new();
    let mut warnings = Vec::new();

    // 1. User config: explicit override, then env var, then platform default
    let user_config_path = match config_dir {
        Some(dir) => Some(dir.join(USER_CONFIG_FILE)),
        None => xdg_config_path(),
    };
    if let Some(path) = user_config_path {
        let source = load_layer(&mut config, &path, &mut warnings)?;
        sources.push(source);
    }

    // 2. Project-local config
    let project_path = project_dir
        .map(|d| d.join(PROJECT_CONFIG_FILE))
        .unwrap_or_else(|| PathBuf::from(PROJECT_CONFIG_FILE));
    let source = load_layer(&mut config, &project_path, &mut warnings)?;
    sources.push(source);

    check_plaintext_token(&config, &mut warnings);

    // 3. Environment
    let env_overrides = apply_env(&mut config, env);

    Ok(LoadedConfig {
        config,
        sources,
        env_overrides,
        warnings,
    })
}

/// Load config from a specific file path (no discovery).
pub fn load_config_file(path: &Path) -> Result<KgraphConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.display().to_string(),
        source: e,
    })?;
    KgraphConfig::from_toml(&contents)
}

/// Get the XDG config file path for kgraph.
pub fn xdg_config_path() -> Option<PathBuf> {
    xdg_config_dir().map(|d| d.join(USER_CONFIG_FILE))
}

/// Get the XDG config directory for kgraph.
///
/// Checks `KGRAPH_CONFIG_DIR` env var first, then falls back to platform default.
pub fn xdg_config_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(CONFIG_DIR_ENV)
        && !dir.is_empty()
    {
        return Some(PathBuf::from(dir));
    }
    dirs::config_dir().map(|d| d.join(APP_NAME))
}

/// Path of the project-local config file in the current directory.
pub fn project_config_path() -> PathBuf {
    PathBuf::from(PROJECT_CONFIG_FILE)
}

/// Try to load a config file and merge it into the existing config.
fn load_layer(
    config: &mut KgraphConfig,
    path: &Path,
    warnings: &mut Vec<String>,
) -> Result<ConfigSource> {
    if !path.is_file() {
        return Ok(ConfigSource {
            path: path.to_path_buf(),
            loaded: false,
        });
    }

    match load_config_file(path) {
        Ok(layer) => {
            config.merge(layer);
            Ok(ConfigSource {
                path: path.to_path_buf(),
                loaded: true,
            })
        }
        Err(e) => {
            warnings.push(format!("Failed to load {}: {}", path.display(), e));
            Ok(ConfigSource {
                path: path.to_path_buf(),
                loaded: false,
            })
        }
    }
}

/// Overlay non-empty environment variables; returns the ones applied.
fn apply_env<F>(config: &mut KgraphConfig, env: F) -> Vec<&'static str>
where
    F: Fn(&str) -> Option<String>,
{
    let lookup = |key: &str| env(key).filter(|v| !v.trim().is_empty());
    let mut applied = Vec::new();
    let mut layer = DatabaseConfig::default();

    if let Some(url) = lookup(DATABASE_URL_ENV) {
        layer.url = Some(url);
        applied.push(DATABASE_URL_ENV);
    }
    if let Some(path) = lookup(LOCAL_REPLICA_PATH_ENV) {
        layer.local_replica_path = Some(PathBuf::from(path));
        applied.push(LOCAL_REPLICA_PATH_ENV);
    }

    if !applied.is_empty() {
        config.merge(KgraphConfig {
            database: Some(layer),
            logging: None,
        });
    }
    applied
}

/// Check for a plaintext auth token in the config and emit a warning.
fn check_plaintext_token(config: &KgraphConfig, warnings: &mut Vec<String>) {
    if let Some(ref db) = config.database
        && db.has_plaintext_auth_token()
    {
        warnings.push(
            "[database] contains a plaintext auth_token. \
             Consider using the system keyring (kgraph config set-token) \
             or the TURSO_AUTH_TOKEN environment variable instead."
                .to_string(),
        );
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_xdg_config_path_exists() {
        if let Some(p) = xdg_config_path() {
            assert!(p.ends_with("config.toml"));
        }
    }

    #[test]
    fn test_load_config_file_not_found() {
        let err = load_config_file(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn test_load_config_invalid_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "this is not valid toml {{{{").unwrap();

        let err = load_config_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_config_no_files() {
        let dir = TempDir::new().unwrap();
        let empty_config_dir = TempDir::new().unwrap();
        let loaded =
            load_config_with_env(Some(dir.path()), Some(empty_config_dir.path()), no_env).unwrap();
        assert!(loaded.config.database.is_none());
        assert!(loaded.loaded_from().is_empty());
        assert!(loaded.env_overrides.is_empty());
    }

    #[test]
    fn test_load_config_layered_merge() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();

        fs::write(
            user_dir.path().join("config.toml"),
            r#"
[database]
url = "libsql://user.turso.io"
relation_policy = "strict"
timeout_secs = 10
"#,
        )
        .unwrap();
        fs::write(
            project_dir.path().join("kgraph.toml"),
            r#"
[database]
url = "libsql://project.turso.io"
"#,
        )
        .unwrap();

        let loaded =
            load_config_with_env(Some(project_dir.path()), Some(user_dir.path()), no_env).unwrap();
        let db = loaded.config.database();

        // Project-local overrides user config, field by field
        assert_eq!(db.url.as_deref(), Some("libsql://project.turso.io"));
        assert_eq!(db.relation_policy(), crate::RelationPolicy::Strict);
        assert_eq!(db.timeout_secs, Some(10));
        assert_eq!(loaded.loaded_from().len(), 2);
    }

    #[test]
    fn test_env_overrides_files() {
        let user_dir = TempDir::new().unwrap();
        let project_dir = TempDir::new().unwrap();
        fs::write(
            project_dir.path().join("kgraph.toml"),
            r#"
[database]
url = "libsql://project.turso.io"
"#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = HashMap::from([
            (DATABASE_URL_ENV, "libsql://env.turso.io"),
            (LOCAL_REPLICA_PATH_ENV, "/tmp/replica.db"),
        ]);
        let loaded = load_config_with_env(Some(project_dir.path()), Some(user_dir.path()), |k| {
            env.get(k).map(|v| v.to_string())
        })
        .unwrap();

        let db = loaded.config.database();
        assert_eq!(db.url.as_deref(), Some("libsql://env.turso.io"));
        assert_eq!(db.local_replica_path, Some(PathBuf::from("/tmp/replica.db")));
        assert_eq!(
            loaded.env_overrides,
            vec![DATABASE_URL_ENV, LOCAL_REPLICA_PATH_ENV]
        );
    }

    #[test]
    fn test_empty_env_values_ignored() {
        let dir = TempDir::new().unwrap();
        let loaded = load_config_with_env(Some(dir.path()), Some(dir.path()), |k| {
            (k == DATABASE_URL_ENV).then(|| "  ".to_string())
        })
        .unwrap();
        assert!(loaded.config.database.is_none());
    }

    #[test]
    fn test_plaintext_token_warning() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("kgraph.toml"),
            r#"
[database]
url = "libsql://db.turso.io"
auth_token = "secret"
"#,
        )
        .unwrap();

        let loaded = load_config_with_env(Some(dir.path()), Some(dir.path()), no_env).unwrap();
        assert_eq!(loaded.warnings.len(), 1);
        assert!(loaded.warnings[0].contains("plaintext"));
    }

    #[test]
    fn test_malformed_config_warns_but_continues() {
        let dir = TempDir::new().unwrap();
        let user_dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kgraph.toml"), "not valid toml {{{{").unwrap();

        let loaded =
            load_config_with_env(Some(dir.path()), Some(user_dir.path()), no_env).unwrap();
        assert!(!loaded.warnings.is_empty());
        assert!(loaded.warnings[0].contains("Failed to load"));
    }

    #[test]
    #[serial_test::serial]
    fn test_config_dir_env_override() {
        let dir = TempDir::new().unwrap();
        // SAFETY: serialized with the other tests touching this variable.
        unsafe { std::env::set_var(CONFIG_DIR_ENV, dir.path()) };
        let resolved = xdg_config_dir();
        unsafe { std::env::remove_var(CONFIG_DIR_ENV) };

        assert_eq!(resolved, Some(dir.path().to_path_buf()));
    }
}
