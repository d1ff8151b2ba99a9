//! Terraform Enterprise private registry client for tfship.
//!
//! This crate wraps the handful of TFE endpoints needed to publish a provider
//! release: provider and signing key creation, version and platform
//! registration, and uploads to the pre-signed URLs those calls return.
//!
//! Registry calls carry the bearer token and a JSON:API content type. Uploads
//! go to the returned URLs as raw bodies with no registry credentials.
//!
//! # Example
//!
//! ```no_run
//! use tfship_registry::TfeClient;
//!
//! let client = TfeClient::new("tfe.example.com", "token").unwrap();
//! assert_eq!(client.base_url(), "https://tfe.example.com");
//! let outcome = client.create_provider("acme", "okta");
//! ```

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tfship_types::{
    EnsureOutcome, PRIVATE_REGISTRY_NAME, PlatformArtifact, Release, UploadTarget,
    VersionUploadTargets,
};

pub mod outcome;

/// Content type of every registry API request.
pub const JSON_API_CONTENT_TYPE: &str = "application/vnd.api+json";

/// Default user agent for API requests
pub const USER_AGENT: &str = concat!("tfship/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    #[error("{action} request failed")]
    Transport {
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{action} returned status {status}: {body}")]
    Status {
        action: &'static str,
        status: u16,
        body: String,
    },

    #[error("failed to parse {action} response")]
    Decode {
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{action} response has no `{link}` link")]
    MissingLink {
        action: &'static str,
        link: &'static str,
    },

    #[error("failed to open {}", path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("upload of {} returned status {status}", path.display())]
    UploadFailed { path: PathBuf, status: u16 },
}

impl RegistryError {
    /// HTTP status attached to the error, if the registry answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            RegistryError::Status { status, .. } | RegistryError::UploadFailed { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }
}

/// Normalize a registry host into a base URL.
///
/// Bare host names get `https://`; values that already carry a scheme are
/// kept. Trailing slashes are removed.
pub fn normalize_base_url(host: &str) -> String {
    let trimmed = host.trim().trim_end_matches('/');
    if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// TFE private registry API client
#[derive(Debug, Clone)]
pub struct TfeClient {
    base_url: String,
    token: String,
    timeout: Option<Duration>,
    http: Client,
}

impl TfeClient {
    /// Create a client for `host` authenticated with `token`.
    pub fn new(host: &str, token: &str) -> Result<Self, RegistryError> {
        Ok(Self {
            base_url: normalize_base_url(host),
            token: token.to_string(),
            timeout: None,
            http: build_http(None)?,
        })
    }

    /// Set the request timeout. Without one the HTTP client default applies.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, RegistryError> {
        self.http = build_http(Some(timeout))?;
        self.timeout = Some(timeout);
        Ok(self)
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Organization-scoped API root, e.g. `https://host/api/v2`.
    pub fn api_base(&self) -> String {
        format!("{}/api/v2", self.base_url)
    }

    /// Endpoint listing the private providers of `namespace`.
    pub fn providers_url(&self, namespace: &str) -> String {
        format!(
            "{}/organizations/{}/registry-providers",
            self.api_base(),
            namespace
        )
    }

    /// GPG key endpoint. It lives outside `/api/v2` on TFE.
    pub fn gpg_keys_url(&self) -> String {
        format!("{}/api/registry/private/v2/gpg-keys", self.base_url)
    }

    pub fn versions_url(&self, release: &Release) -> String {
        format!(
            "{}/{}/{}/{}/versions",
            self.providers_url(&release.namespace),
            PRIVATE_REGISTRY_NAME,
            release.namespace,
            release.provider
        )
    }

    pub fn platforms_url(&self, release: &Release) -> String {
        format!(
            "{}/{}/platforms",
            self.versions_url(release),
            release.version
        )
    }

    /// Registry UI page for the provider.
    pub fn provider_page_url(&self, release: &Release) -> String {
        format!(
            "{}/app/{}/registry/providers/{}/{}/{}",
            self.base_url,
            release.namespace,
            PRIVATE_REGISTRY_NAME,
            release.namespace,
            release.provider
        )
    }

    /// Create the provider entry. An existing provider is a success outcome.
    pub fn create_provider(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<EnsureOutcome, RegistryError> {
        let doc = Document::new(
            "registry-providers",
            ProviderAttributes {
                name,
                namespace,
                registry_name: PRIVATE_REGISTRY_NAME,
            },
        );
        let action = "provider creation";
        let resp = self.post(&self.providers_url(namespace), &doc, action)?;
        let status = resp.status();
        let body = read_text(resp);
        Ok(outcome::provider_created(status, &body))
    }

    /// Upload an ASCII-armored public key for `namespace`.
    pub fn upload_gpg_key(
        &self,
        namespace: &str,
        ascii_armor: &str,
    ) -> Result<EnsureOutcome, RegistryError> {
        let doc = Document::new(
            "gpg-keys",
            GpgKeyAttributes {
                namespace,
                ascii_armor,
            },
        );
        let action = "signing key upload";
        let resp = self.post(&self.gpg_keys_url(), &doc, action)?;
        let status = resp.status();
        let body = read_text(resp);
        Ok(outcome::signing_key_uploaded(status, &body))
    }

    /// Register `release` and return the checksum upload targets.
    pub fn create_version(&self, release: &Release) -> Result<VersionUploadTargets, RegistryError> {
        let doc = Document::new(
            "registry-provider-versions",
            VersionAttributes {
                version: &release.version,
                key_id: &release.key_id,
                protocols: &release.protocols,
            },
        );
        let action = "version creation";
        let resp = self.post(&self.versions_url(release), &doc, action)?;
        let links: VersionLinks = expect_registered(resp, action)?;

        Ok(VersionUploadTargets {
            shasums: require_link(links.shasums_upload, action, "shasums-upload")?,
            shasums_sig: require_link(links.shasums_sig_upload, action, "shasums-sig-upload")?,
        })
    }

    /// Register one platform of `release` and return its binary upload target.
    pub fn create_platform(
        &self,
        release: &Release,
        artifact: &PlatformArtifact,
    ) -> Result<UploadTarget, RegistryError> {
        let doc = Document::new(
            "registry-provider-version-platforms",
            PlatformAttributes {
                os: &artifact.platform.os,
                arch: &artifact.platform.arch,
                shasum: &artifact.digest,
                filename: &artifact.filename,
            },
        );
        let action = "platform registration";
        let resp = self.post(&self.platforms_url(release), &doc, action)?;
        let links: PlatformLinks = expect_registered(resp, action)?;
        require_link(links.provider_binary_upload, action, "provider-binary-upload")
    }

    /// Stream the file at `path` to `target`.
    ///
    /// The response status is checked: anything but a 2xx is
    /// [`RegistryError::UploadFailed`].
    pub fn upload_file(&self, target: &UploadTarget, path: &Path) -> Result<(), RegistryError> {
        let file = File::open(path).map_err(|source| RegistryError::OpenFile {
            path: path.to_path_buf(),
            source,
        })?;

        let resp = self
            .http
            .put(target.as_str())
            .body(Body::from(file))
            .send()
            .map_err(|source| RegistryError::Transport {
                action: "upload",
                source,
            })?;

        if outcome::uploaded(resp.status()) {
            Ok(())
        } else {
            Err(RegistryError::UploadFailed {
                path: path.to_path_buf(),
                status: resp.status().as_u16(),
            })
        }
    }

    fn post<T: Serialize>(
        &self,
        url: &str,
        doc: &Document<T>,
        action: &'static str,
    ) -> Result<Response, RegistryError> {
        self.authorized(self.http.post(url))
            .json(doc)
            .send()
            .map_err(|source| RegistryError::Transport { action, source })
    }

    fn authorized(&self, req: RequestBuilder) -> RequestBuilder {
        req.bearer_auth(&self.token)
            .header(CONTENT_TYPE, JSON_API_CONTENT_TYPE)
    }
}

fn build_http(timeout: Option<Duration>) -> Result<Client, RegistryError> {
    let mut builder = Client::builder().user_agent(USER_AGENT);
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    builder.build().map_err(RegistryError::Client)
}

fn read_text(resp: Response) -> String {
    resp.text().unwrap_or_default()
}

fn expect_registered<L: for<'de> Deserialize<'de>>(
    resp: Response,
    action: &'static str,
) -> Result<L, RegistryError> {
    let status = resp.status();
    if !outcome::registered(status) {
        return Err(RegistryError::Status {
            action,
            status: status.as_u16(),
            body: read_text(resp),
        });
    }

    let doc: LinksDocument<L> = resp
        .json()
        .map_err(|source| RegistryError::Decode { action, source })?;
    Ok(doc.data.links)
}

fn require_link(
    link: Option<String>,
    action: &'static str,
    name: &'static str,
) -> Result<UploadTarget, RegistryError> {
    link.map(UploadTarget::new)
        .ok_or(RegistryError::MissingLink { action, link: name })
}

/// JSON:API request document.
#[derive(Debug, Serialize)]
struct Document<T> {
    data: Resource<T>,
}

#[derive(Debug, Serialize)]
struct Resource<T> {
    #[serde(rename = "type")]
    kind: &'static str,
    attributes: T,
}

impl<T> Document<T> {
    fn new(kind: &'static str, attributes: T) -> Self {
        Self {
            data: Resource { kind, attributes },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct ProviderAttributes<'a> {
    name: &'a str,
    namespace: &'a str,
    registry_name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct GpgKeyAttributes<'a> {
    namespace: &'a str,
    ascii_armor: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "kebab-case")]
struct VersionAttributes<'a> {
    version: &'a str,
    key_id: &'a str,
    protocols: &'a [String],
}

#[derive(Debug, Serialize)]
struct PlatformAttributes<'a> {
    os: &'a str,
    arch: &'a str,
    shasum: &'a str,
    filename: &'a str,
}

/// JSON:API response document; only `data.links` is read.
#[derive(Debug, Deserialize)]
struct LinksDocument<L> {
    data: LinksData<L>,
}

#[derive(Debug, Deserialize)]
struct LinksData<L> {
    links: L,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct VersionLinks {
    shasums_upload: Option<String>,
    shasums_sig_upload: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PlatformLinks {
    provider_binary_upload: Option<String>,
}
