//! Token resolution for tfship.
//!
//! A registry token is looked up in order:
//! - `TFE_TOKEN`
//! - `TF_TOKEN_<host>`, the per-host variable Terraform itself reads
//! - the Terraform CLI credentials file (`credentials.tfrc.json`)
//!
//! # Example
//!
//! ```
//! use tfship_auth::resolve_token;
//!
//! let auth = resolve_token("tfe.example.com", None);
//! if let Some(token) = auth.token {
//!     println!("using token from {}", auth.source);
//! }
//! ```

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Environment variable holding the registry token.
pub const TFE_TOKEN_ENV: &str = "TFE_TOKEN";

/// Prefix of Terraform's per-host token variables.
pub const TF_TOKEN_PREFIX: &str = "TF_TOKEN_";

/// Environment variable overriding the Terraform CLI config directory.
pub const TF_CLI_CONFIG_DIR_ENV: &str = "TF_CLI_CONFIG_DIR";

/// Credentials file written by `terraform login`.
pub const CREDENTIALS_FILE: &str = "credentials.tfrc.json";

/// Authentication information
#[derive(Debug, Clone, Default)]
pub struct AuthInfo {
    /// The resolved token (if found)
    pub token: Option<String>,
    /// Source of the token
    pub source: TokenSource,
}

impl AuthInfo {
    pub fn detected(&self) -> bool {
        self.token.is_some()
    }
}

/// Source of the authentication token
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TokenSource {
    #[default]
    None,
    /// From `TFE_TOKEN`
    EnvDefault,
    /// From `TF_TOKEN_<host>`
    EnvHost,
    /// From `credentials.tfrc.json`
    CredentialsFile,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::None => write!(f, "none"),
            TokenSource::EnvDefault => write!(f, "TFE_TOKEN"),
            TokenSource::EnvHost => write!(f, "TF_TOKEN_<host>"),
            TokenSource::CredentialsFile => write!(f, "credentials.tfrc.json"),
        }
    }
}

/// Resolve the token for `host` (a bare host name, optionally with a port).
///
/// `config_dir` overrides where the credentials file is looked up; it
/// defaults to `$TF_CLI_CONFIG_DIR` or `~/.terraform.d`.
pub fn resolve_token(host: &str, config_dir: Option<&Path>) -> AuthInfo {
    if let Some(token) = non_empty_var(TFE_TOKEN_ENV) {
        return AuthInfo {
            token: Some(token),
            source: TokenSource::EnvDefault,
        };
    }

    if let Some(token) = non_empty_var(&host_token_var(host)) {
        return AuthInfo {
            token: Some(token),
            source: TokenSource::EnvHost,
        };
    }

    let path = terraform_config_dir(config_dir).join(CREDENTIALS_FILE);
    if let Ok(Some(token)) = token_from_credentials_file(&path, host) {
        return AuthInfo {
            token: Some(token),
            source: TokenSource::CredentialsFile,
        };
    }

    AuthInfo::default()
}

/// Name of Terraform's per-host token variable.
///
/// Dots become underscores and dashes become double underscores, so
/// `tfe.my-corp.io` maps to `TF_TOKEN_tfe_my__corp_io`.
pub fn host_token_var(host: &str) -> String {
    let encoded = host.replace('-', "__").replace('.', "_");
    format!("{TF_TOKEN_PREFIX}{encoded}")
}

/// Get the Terraform CLI config directory.
pub fn terraform_config_dir(config_dir: Option<&Path>) -> PathBuf {
    if let Some(path) = config_dir {
        return path.to_path_buf();
    }

    if let Some(path) = env::var_os(TF_CLI_CONFIG_DIR_ENV) {
        return PathBuf::from(path);
    }

    if let Some(home) = dirs::home_dir() {
        return home.join(".terraform.d");
    }

    PathBuf::from(".terraform.d")
}

#[derive(Debug, Deserialize)]
struct CredentialsFile {
    #[serde(default)]
    credentials: BTreeMap<String, HostCredentials>,
}

#[derive(Debug, Deserialize)]
struct HostCredentials {
    token: Option<String>,
}

/// Read the token for `host` from a `credentials.tfrc.json` file.
///
/// Returns `Ok(None)` when the file does not exist or has no entry for the
/// host.
pub fn token_from_credentials_file(path: &Path, host: &str) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read credentials file: {}", path.display()))?;
    let parsed: CredentialsFile = serde_json::from_str(&content)
        .with_context(|| format!("failed to parse credentials file: {}", path.display()))?;

    Ok(parsed
        .credentials
        .get(host)
        .and_then(|c| c.token.clone())
        .filter(|t| !t.is_empty()))
}

/// Mask a token for safe display (show first 4 and last 4 chars).
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.is_empty())
}
