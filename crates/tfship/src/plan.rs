//! Offline view of a publish run: which files are used and which manifest
//! lines turn into platform registrations.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::PublishConfig;
use crate::manifest::{ChecksumManifest, ManifestEntry, ManifestError};
use crate::registry::normalize_base_url;
use crate::types::{PlatformArtifact, Release};

/// Errors raised before the first registry call.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("{what} not found at {}", path.display())]
    MissingFile { what: &'static str, path: PathBuf },

    #[error("failed to read {what} {}", path.display())]
    Read {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Local inputs of one release, resolved against the artifact directory.
#[derive(Debug, Clone)]
pub struct PublishPlan {
    pub release: Release,
    /// Registry base URL
    pub registry: String,
    pub dist_dir: PathBuf,
    pub shasums_path: PathBuf,
    pub shasums_sig_path: PathBuf,
    pub gpg_key_path: PathBuf,
    pub manifest: ChecksumManifest,
}

/// Read the checksum manifest and lay out the paths a run will use.
///
/// Only the manifest has to exist; see [`PublishPlan::preflight`] for the
/// remaining files.
pub fn build_plan(config: &PublishConfig) -> Result<PublishPlan, PublishError> {
    let release = config.release();
    let shasums_path = config.dist_dir.join(release.shasums_filename());
    let shasums_sig_path = config.dist_dir.join(release.shasums_sig_filename());
    let manifest = ChecksumManifest::read(&shasums_path)?;

    Ok(PublishPlan {
        registry: normalize_base_url(&config.host),
        dist_dir: config.dist_dir.clone(),
        gpg_key_path: config.gpg_key_path(),
        shasums_path,
        shasums_sig_path,
        manifest,
        release,
    })
}

impl PublishPlan {
    /// Local path of a platform binary.
    pub fn binary_path(&self, artifact: &PlatformArtifact) -> PathBuf {
        self.dist_dir.join(&artifact.filename)
    }

    /// Check the signature and public key exist.
    pub fn preflight(&self) -> Result<(), PublishError> {
        require_file("checksum manifest", &self.shasums_path)?;
        require_file("checksum signature", &self.shasums_sig_path)?;
        require_file("GPG public key", &self.gpg_key_path)?;
        Ok(())
    }

    /// Read the ASCII-armored public key.
    pub fn read_key_armor(&self) -> Result<String, PublishError> {
        fs::read_to_string(&self.gpg_key_path).map_err(|source| PublishError::Read {
            what: "GPG public key",
            path: self.gpg_key_path.clone(),
            source,
        })
    }

    /// Decodable artifacts whose binary is not in the artifact directory.
    pub fn missing_binaries(&self) -> Vec<&PlatformArtifact> {
        self.manifest
            .artifacts()
            .filter(|a| !self.binary_path(a).is_file())
            .collect()
    }

    /// Human-readable listing used by `tfship plan`.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Release: {}", self.release.label());
        let _ = writeln!(out, "Registry: {}", self.registry);
        let _ = writeln!(out, "Key id: {}", self.release.key_id);
        let _ = writeln!(out, "Protocols: {}", self.release.protocols.join(", "));
        let _ = writeln!(out, "Checksums: {}", self.release.shasums_filename());
        let _ = writeln!(out, "Signature: {}", self.release.shasums_sig_filename());
        let _ = writeln!(out);

        let platforms = self.manifest.artifacts().count();
        let _ = writeln!(out, "Platforms ({platforms}):");
        for entry in self.manifest.entries() {
            match entry {
                ManifestEntry::Platform { line, artifact } => {
                    let _ = writeln!(
                        out,
                        "  {line:>3}. {:<16} {}",
                        artifact.platform.to_string(),
                        artifact.filename
                    );
                }
                ManifestEntry::Unparseable {
                    line,
                    filename,
                    error,
                } => {
                    let _ = writeln!(out, "  {line:>3}. skip             {filename} ({error})");
                }
            }
        }

        if !self.manifest.ignored().is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "Ignored lines:");
            for ignored in self.manifest.ignored() {
                let _ = writeln!(out, "  {:>3}. {}", ignored.line, ignored.error);
            }
        }

        out
    }
}

fn require_file(what: &'static str, path: &Path) -> Result<(), PublishError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PublishError::MissingFile {
            what,
            path: path.to_path_buf(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PartialFailurePolicy, Platform};
    use tempfile::tempdir;

    fn config(dist: &Path) -> PublishConfig {
        PublishConfig {
            host: "tfe.example.com".to_string(),
            organization: "acme".to_string(),
            provider: "okta".to_string(),
            version: "1.0.0".to_string(),
            key_id: "ABCDEF0123456789".to_string(),
            token: None,
            dist_dir: dist.to_path_buf(),
            gpg_key_file: None,
            protocols: vec!["5.0".to_string()],
            timeout: None,
            partial_failure: PartialFailurePolicy::Fail,
        }
    }

    fn write(dir: &Path, name: &str, content: &str) {
        fs::write(dir.join(name), content).expect("write");
    }

    #[test]
    fn build_plan_requires_manifest() {
        let td = tempdir().expect("tempdir");
        let err = build_plan(&config(td.path())).unwrap_err();
        assert!(matches!(err, PublishError::Manifest(_)));
        assert!(err.to_string().contains("terraform-provider-okta_1.0.0_SHA256SUMS"));
    }

    #[test]
    fn plan_paths_follow_release() {
        let td = tempdir().expect("tempdir");
        write(td.path(), "terraform-provider-okta_1.0.0_SHA256SUMS", "");
        let plan = build_plan(&config(td.path())).expect("plan");

        assert_eq!(plan.registry, "https://tfe.example.com");
        assert_eq!(
            plan.shasums_sig_path,
            td.path().join("terraform-provider-okta_1.0.0_SHA256SUMS.sig")
        );
        assert_eq!(plan.gpg_key_path, td.path().join("gpg-public-key.asc"));
        assert!(plan.manifest.is_empty());
    }

    #[test]
    fn preflight_reports_first_missing_file() {
        let td = tempdir().expect("tempdir");
        write(td.path(), "terraform-provider-okta_1.0.0_SHA256SUMS", "");
        let plan = build_plan(&config(td.path())).expect("plan");

        let err = plan.preflight().unwrap_err();
        assert!(matches!(
            err,
            PublishError::MissingFile {
                what: "checksum signature",
                ..
            }
        ));

        write(td.path(), "terraform-provider-okta_1.0.0_SHA256SUMS.sig", "sig");
        let err = plan.preflight().unwrap_err();
        assert!(matches!(
            err,
            PublishError::MissingFile {
                what: "GPG public key",
                ..
            }
        ));

        write(td.path(), "gpg-public-key.asc", "armor");
        plan.preflight().expect("preflight");
        assert_eq!(plan.read_key_armor().expect("armor"), "armor");
    }

    #[test]
    fn custom_key_file_is_used() {
        let td = tempdir().expect("tempdir");
        write(td.path(), "terraform-provider-okta_1.0.0_SHA256SUMS", "");
        let mut cfg = config(td.path());
        cfg.gpg_key_file = Some(td.path().join("keys/release.asc"));
        let plan = build_plan(&cfg).expect("plan");
        assert_eq!(plan.gpg_key_path, td.path().join("keys/release.asc"));
    }

    #[test]
    fn missing_binaries_lists_absent_files() {
        let td = tempdir().expect("tempdir");
        write(
            td.path(),
            "terraform-provider-okta_1.0.0_SHA256SUMS",
            "aaa terraform-provider-okta_1.0.0_linux_amd64.zip\n\
             bbb terraform-provider-okta_1.0.0_darwin_arm64.zip\n",
        );
        write(td.path(), "terraform-provider-okta_1.0.0_linux_amd64.zip", "bin");
        let plan = build_plan(&config(td.path())).expect("plan");

        let missing: Vec<Platform> = plan
            .missing_binaries()
            .into_iter()
            .map(|a| a.platform.clone())
            .collect();
        assert_eq!(missing, vec![Platform::new("darwin", "arm64")]);
    }

    #[test]
    fn render_lists_platforms_skips_and_ignored_lines() {
        let td = tempdir().expect("tempdir");
        write(
            td.path(),
            "terraform-provider-okta_1.0.0_SHA256SUMS",
            "aaa terraform-provider-okta_1.0.0_linux_amd64.zip\n\
             bbb\n\
             ccc terraform-provider-okta_1.0.0_manifest.json\n\
             ddd terraform-provider-okta_1.0.0_darwin_arm64.zip\n",
        );
        let plan = build_plan(&config(td.path())).expect("plan");

        insta::assert_snapshot!(plan.render(), @r"
        Release: acme/okta@1.0.0
        Registry: https://tfe.example.com
        Key id: ABCDEF0123456789
        Protocols: 5.0
        Checksums: terraform-provider-okta_1.0.0_SHA256SUMS
        Signature: terraform-provider-okta_1.0.0_SHA256SUMS.sig

        Platforms (2):
            1. linux_amd64      terraform-provider-okta_1.0.0_linux_amd64.zip
            3. skip             terraform-provider-okta_1.0.0_manifest.json (cannot parse OS/arch from terraform-provider-okta_1.0.0_manifest.json: 3 segment(s), need at least 4)
            4. darwin_arm64     terraform-provider-okta_1.0.0_darwin_arm64.zip

        Ignored lines:
            2. expected 2 whitespace-separated fields, found 1
        ");
    }
}
