//! Auth token storage and retrieval.
//!
//! Resolution order:
//! 1. System keyring (if `keyring` feature enabled)
//! 2. `TURSO_AUTH_TOKEN` environment variable
//! 3. Config file (with warning)
//!
//! Keyring entries are stored as service="kgraph", user="turso_auth_token".

use crate::discovery::AUTH_TOKEN_ENV;

/// Keyring service name.
const SERVICE_NAME: &str = "kgraph";

/// Keyring user name for the auth token.
const KEYRING_USER: &str = "turso_auth_token";

/// Result of token resolution with provenance.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedSecret {
    /// The secret value.
    pub value: String,
    /// Where the secret was found.
    pub source: SecretSource,
}

impl std::fmt::Debug for ResolvedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecret")
            .field("value", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// Where a secret was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretSource {
    /// Given on the command line.
    CommandLine,
    /// OS keyring (macOS Keychain, Linux secret-service, Windows Credential Manager).
    Keyring,
    /// Environment variable.
    EnvVar(String),
    /// Config file (plaintext, not recommended).
    ConfigFile,
}

impl std::fmt::Display for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::CommandLine => write!(f, "command line"),
            SecretSource::Keyring => write!(f, "system keyring"),
            SecretSource::EnvVar(var) => write!(f, "env var {}", var),
            SecretSource::ConfigFile => write!(f, "config file (plaintext)"),
        }
    }
}

/// Resolve the auth token using the full resolution chain.
pub fn resolve_auth_token(config_value: Option<&str>) -> Option<ResolvedSecret> {
    resolve_auth_token_with_env(config_value, |key| std::env::var(key).ok())
}

/// Resolve the auth token reading environment variables through `env`.
pub fn resolve_auth_token_with_env<F>(
    config_value: Option<&str>,
    env: F,
) -> Option<ResolvedSecret>
where
    F: Fn(&str) -> Option<String>,
{
    // 1. Keyring
    if let Some(secret) = get_from_keyring() {
        return Some(secret);
    }

    // 2. Environment variable
    if let Some(value) = env(AUTH_TOKEN_ENV)
        && !value.is_empty()
    {
        return Some(ResolvedSecret {
            value,
            source: SecretSource::EnvVar(AUTH_TOKEN_ENV.to_string()),
        });
    }

    // 3. Config file
    config_value
        .filter(|v| !v.is_empty())
        .map(|v| ResolvedSecret {
            value: v.to_string(),
            source: SecretSource::ConfigFile,
        })
}

/// Store the auth token in the system keyring.
///
/// Returns an error message if keyring is not available.
pub fn store_in_keyring(token: &str) -> std::result::Result<(), String> {
    store_keyring_entry(SERVICE_NAME, KEYRING_USER, token)
}

/// Delete the auth token from the system keyring.
pub fn delete_from_keyring() -> std::result::Result<(), String> {
    delete_keyring_entry(SERVICE_NAME, KEYRING_USER)
}

/// Check if the keyring holds an auth token.
pub fn has_keyring_entry() -> bool {
    get_from_keyring().is_some()
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyring implementation (feature-gated)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "keyring")]
fn get_from_keyring() -> Option<ResolvedSecret> {
    // Tests stay isolated from the local machine's keyring.
    if cfg!(test) {
        return None;
    }

    let entry = keyring::Entry::new(SERVICE_NAME, KEYRING_USER).ok()?;
    let value = entry.get_password().ok()?;
    if value.is_empty() {
        return None;
    }
    Some(ResolvedSecret {
        value,
        source: SecretSource::Keyring,
    })
}

#[cfg(feature = "keyring")]
fn store_keyring_entry(service: &str, user: &str, secret: &str) -> std::result::Result<(), String> {
    if cfg!(test) {
        return Err("keyring access disabled in tests".to_string());
    }
    let entry = keyring::Entry::new(service, user).map_err(|e| format!("keyring error: {}", e))?;
    entry
        .set_password(secret)
        .map_err(|e| format!("failed to store in keyring: {}", e))
}

#[cfg(feature = "keyring")]
fn delete_keyring_entry(service: &str, user: &str) -> std::result::Result<(), String> {
    if cfg!(test) {
        return Err("keyring access disabled in tests".to_string());
    }
    let entry = keyring::Entry::new(service, user).map_err(|e| format!("keyring error: {}", e))?;
    entry
        .delete_credential()
        .map_err(|e| format!("failed to delete from keyring: {}", e))
}

// ─────────────────────────────────────────────────────────────────────────────
// No-op stubs when keyring feature is disabled
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(not(feature = "keyring"))]
fn get_from_keyring() -> Option<ResolvedSecret> {
    None
}

#[cfg(not(feature = "keyring"))]
fn store_keyring_entry(
    _service: &str,
    _user: &str,
    _secret: &str,
) -> std::result::Result<(), String> {
    Err("keyring support not compiled in (enable the 'keyring' feature)".to_string())
}

#[cfg(not(feature = "keyring"))]
fn delete_keyring_entry(_service: &str, _user: &str) -> std::result::Result<(), String> {
    Err("keyring support not compiled in (enable the 'keyring' feature)".to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
