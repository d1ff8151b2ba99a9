//! Run configuration and the optional `.tfship.toml` file.
//!
//! The sequencer only ever sees a [`PublishConfig`]. How its fields were
//! found (flags, environment, config file) is decided by the caller, which
//! fills a [`ConfigInputs`] and calls [`resolve`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::registry::TfeClient;
use crate::types::{DEFAULT_PROTOCOLS, PartialFailurePolicy, Release};

/// File name looked up in the working directory.
pub const CONFIG_FILE: &str = ".tfship.toml";

/// Registry host used when none is configured.
pub const DEFAULT_HOST: &str = "app.terraform.io";

/// Artifact directory used when none is configured.
pub const DEFAULT_DIST_DIR: &str = "dist";

/// Armored public key file name inside the artifact directory.
pub const DEFAULT_GPG_KEY_FILE: &str = "gpg-public-key.asc";

/// Everything one publish run needs.
#[derive(Clone)]
pub struct PublishConfig {
    /// Registry host or base URL
    pub host: String,
    /// TFE organization, also the registry namespace
    pub organization: String,
    pub provider: String,
    pub version: String,
    /// Identifier of the key the checksums were signed with
    pub key_id: String,
    /// Bearer token; only needed to talk to the registry
    pub token: Option<String>,
    pub dist_dir: PathBuf,
    /// Armored public key; defaults to `<dist_dir>/gpg-public-key.asc`
    pub gpg_key_file: Option<PathBuf>,
    pub protocols: Vec<String>,
    pub timeout: Option<Duration>,
    pub partial_failure: PartialFailurePolicy,
}

impl fmt::Debug for PublishConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishConfig")
            .field("host", &self.host)
            .field("organization", &self.organization)
            .field("provider", &self.provider)
            .field("version", &self.version)
            .field("key_id", &self.key_id)
            .field("token", &self.token.as_deref().map(crate::auth::mask_token))
            .field("dist_dir", &self.dist_dir)
            .field("gpg_key_file", &self.gpg_key_file)
            .field("protocols", &self.protocols)
            .field("timeout", &self.timeout)
            .field("partial_failure", &self.partial_failure)
            .finish()
    }
}

impl PublishConfig {
    pub fn release(&self) -> Release {
        Release {
            namespace: self.organization.clone(),
            provider: self.provider.clone(),
            version: self.version.clone(),
            key_id: self.key_id.clone(),
            protocols: self.protocols.clone(),
        }
    }

    pub fn gpg_key_path(&self) -> PathBuf {
        self.gpg_key_file
            .clone()
            .unwrap_or_else(|| self.dist_dir.join(DEFAULT_GPG_KEY_FILE))
    }

    /// Build a registry client. Fails when no token is configured.
    pub fn client(&self) -> Result<TfeClient> {
        let Some(token) = self.token.as_deref() else {
            bail!(
                "no registry token found (set TFE_TOKEN, TF_TOKEN_<host>, or run `terraform login`)"
            );
        };
        let client = TfeClient::new(&self.host, token)?;
        match self.timeout {
            Some(timeout) => Ok(client.with_timeout(timeout)?),
            None => Ok(client),
        }
    }

    /// Reject configurations that cannot produce a valid run.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("host", &self.host),
            ("organization", &self.organization),
            ("provider", &self.provider),
            ("key id", &self.key_id),
        ] {
            if value.trim().is_empty() {
                bail!("{name} cannot be empty");
            }
        }
        validate_version(&self.version)?;
        if self.protocols.is_empty() {
            bail!("at least one protocol version is required");
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            bail!("timeout must be greater than 0");
        }
        Ok(())
    }
}

/// Strip a leading `v` tag prefix. Returns the version and whether a prefix
/// was removed.
pub fn normalize_version(raw: &str) -> (String, bool) {
    let trimmed = raw.trim();
    match trimmed.strip_prefix('v') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => (rest.to_string(), true),
        _ => (trimmed.to_string(), false),
    }
}

fn validate_version(version: &str) -> Result<()> {
    if version.is_empty() {
        bail!("version cannot be empty");
    }
    if version
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == '_')
    {
        bail!("invalid version {version:?}: must not contain whitespace, '/' or '_'");
    }
    Ok(())
}

/// Values supplied by the caller (flags and environment), highest precedence.
#[derive(Debug, Clone, Default)]
pub struct ConfigInputs {
    pub host: Option<String>,
    pub organization: Option<String>,
    pub provider: Option<String>,
    pub key_id: Option<String>,
    pub token: Option<String>,
    pub dist_dir: Option<PathBuf>,
    pub gpg_key_file: Option<PathBuf>,
    pub protocols: Option<Vec<String>>,
    pub timeout: Option<Duration>,
    pub allow_partial: bool,
}

/// Merge caller inputs over the config file and defaults.
pub fn resolve(version: &str, inputs: ConfigInputs, file: &TfshipConfig) -> Result<PublishConfig> {
    let organization = inputs
        .organization
        .or_else(|| file.registry.organization.clone())
        .context("organization is required (--org, TFE_ORG, or [registry] organization)")?;
    let provider = inputs
        .provider
        .or_else(|| file.provider.name.clone())
        .context("provider name is required (--provider, PROVIDER_NAME, or [provider] name)")?;
    let key_id = inputs
        .key_id
        .or_else(|| file.provider.key_id.clone())
        .context("signing key id is required (--key-id, GPG_KEY_ID, or [provider] key_id)")?;

    let partial_failure = if inputs.allow_partial {
        PartialFailurePolicy::Allow
    } else {
        file.policy.partial_failure
    };

    let config = PublishConfig {
        host: inputs
            .host
            .or_else(|| file.registry.host.clone())
            .unwrap_or_else(|| DEFAULT_HOST.to_string()),
        organization,
        provider,
        version: version.to_string(),
        key_id,
        token: inputs.token,
        dist_dir: inputs
            .dist_dir
            .or_else(|| file.artifacts.dist_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DIST_DIR)),
        gpg_key_file: inputs
            .gpg_key_file
            .or_else(|| file.artifacts.gpg_key_file.clone()),
        protocols: inputs
            .protocols
            .or_else(|| file.provider.protocols.clone())
            .unwrap_or_else(|| DEFAULT_PROTOCOLS.iter().map(|p| p.to_string()).collect()),
        timeout: inputs.timeout.or(file.http.timeout),
        partial_failure,
    };

    config.validate()?;
    Ok(config)
}

/// Contents of `.tfship.toml`. Every field is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TfshipConfig {
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub provider: ProviderSection,
    #[serde(default)]
    pub artifacts: ArtifactsSection,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub policy: PolicySection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrySection {
    pub host: Option<String>,
    pub organization: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSection {
    pub name: Option<String>,
    pub key_id: Option<String>,
    pub protocols: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactsSection {
    pub dist_dir: Option<PathBuf>,
    pub gpg_key_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HttpSection {
    /// Request timeout, e.g. `"30s"`
    #[serde(
        default,
        deserialize_with = "deserialize_opt_duration",
        serialize_with = "serialize_opt_duration"
    )]
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySection {
    #[serde(default)]
    pub partial_failure: PartialFailurePolicy,
}

impl TfshipConfig {
    /// Load `.tfship.toml` from `dir`. Returns `Ok(None)` if it does not exist.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(None);
        }
        Self::load_from_file(&path).map(Some)
    }

    /// Load configuration from a specific file path
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: TfshipConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let present = [
            ("registry.host", self.registry.host.as_deref()),
            ("registry.organization", self.registry.organization.as_deref()),
            ("provider.name", self.provider.name.as_deref()),
            ("provider.key_id", self.provider.key_id.as_deref()),
        ];
        for (name, value) in present {
            if value.is_some_and(|v| v.trim().is_empty()) {
                bail!("{name} cannot be empty");
            }
        }
        if self.provider.protocols.as_ref().is_some_and(Vec::is_empty) {
            bail!("provider.protocols cannot be empty");
        }
        if self.http.timeout.is_some_and(|t| t.is_zero()) {
            bail!("http.timeout must be greater than 0");
        }
        Ok(())
    }
}

fn deserialize_opt_duration<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    raw.map(|s| humantime::parse_duration(&s).map_err(serde::de::Error::custom))
        .transpose()
}

fn serialize_opt_duration<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(d) => serializer.serialize_some(&humantime::format_duration(*d).to_string()),
        None => serializer.serialize_none(),
    }
}
