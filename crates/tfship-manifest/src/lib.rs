//! Checksum manifest parsing for tfship.
//!
//! A release build produces a `SHA256SUMS` file with one
//! `<hex-digest> <filename>` pair per line. This crate turns that file into an
//! ordered list of entries and derives the target platform of each artifact
//! from its file name (`terraform-provider-okta_1.0.0_linux_amd64.zip` is
//! `linux`/`amd64`).
//!
//! # Example
//!
//! ```
//! use tfship_manifest::parse_manifest;
//!
//! let manifest = parse_manifest(
//!     "abc123  terraform-provider-okta_1.0.0_linux_amd64.zip\n\
//!      def456  terraform-provider-okta_1.0.0_darwin_arm64.zip\n",
//! );
//!
//! let platforms: Vec<String> = manifest
//!     .artifacts()
//!     .map(|a| a.platform.to_string())
//!     .collect();
//! assert_eq!(platforms, ["linux_amd64", "darwin_arm64"]);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tfship_types::{Platform, PlatformArtifact};

/// Extensions stripped from artifact names before splitting on underscores.
pub const KNOWN_EXTENSIONS: &[&str] = &[".zip"];

/// Minimum underscore-delimited segments in an artifact name:
/// `<name>_<version>_<os>_<arch>`.
pub const MIN_SEGMENTS: usize = 4;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read checksum manifest {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a single manifest line did not yield a platform.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("expected 2 whitespace-separated fields, found {found}")]
    FieldCount { found: usize },
    #[error(
        "cannot parse OS/arch from {filename}: {found} segment(s), need at least {min}",
        min = MIN_SEGMENTS
    )]
    Segments { filename: String, found: usize },
}

/// A manifest line with a digest and a file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    /// The file name decodes to a platform.
    Platform {
        line: usize,
        artifact: PlatformArtifact,
    },
    /// Two fields, but the file name does not carry an OS/arch suffix.
    Unparseable {
        line: usize,
        filename: String,
        error: LineError,
    },
}

impl ManifestEntry {
    pub fn line(&self) -> usize {
        match self {
            ManifestEntry::Platform { line, .. } | ManifestEntry::Unparseable { line, .. } => *line,
        }
    }

    pub fn filename(&self) -> &str {
        match self {
            ManifestEntry::Platform { artifact, .. } => &artifact.filename,
            ManifestEntry::Unparseable { filename, .. } => filename,
        }
    }
}

/// A non-blank line that does not split into exactly two fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoredLine {
    pub line: usize,
    pub error: LineError,
}

/// Parsed checksum manifest, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumManifest {
    entries: Vec<ManifestEntry>,
    ignored: Vec<IgnoredLine>,
}

impl ChecksumManifest {
    /// Read and parse a manifest file.
    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(parse_manifest(&content))
    }

    /// Two-field entries, in manifest order. Duplicates are kept.
    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    /// Lines dropped for having the wrong number of fields.
    pub fn ignored(&self) -> &[IgnoredLine] {
        &self.ignored
    }

    /// Entries that decode to a platform, in manifest order.
    pub fn artifacts(&self) -> impl Iterator<Item = &PlatformArtifact> {
        self.entries.iter().filter_map(|e| match e {
            ManifestEntry::Platform { artifact, .. } => Some(artifact),
            ManifestEntry::Unparseable { .. } => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Parse manifest text. Never fails: bad lines are recorded, not fatal.
pub fn parse_manifest(content: &str) -> ChecksumManifest {
    let mut manifest = ChecksumManifest::default();

    for (idx, raw) in content.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }

        let (digest, filename) = match split_line(raw) {
            Ok(fields) => fields,
            Err(error) => {
                manifest.ignored.push(IgnoredLine { line, error });
                continue;
            }
        };

        let entry = match derive_platform(filename) {
            Ok(platform) => ManifestEntry::Platform {
                line,
                artifact: PlatformArtifact {
                    platform,
                    digest: digest.to_string(),
                    filename: filename.to_string(),
                },
            },
            Err(error) => ManifestEntry::Unparseable {
                line,
                filename: filename.to_string(),
                error,
            },
        };
        manifest.entries.push(entry);
    }

    manifest
}

/// Split a manifest line into `(digest, filename)`.
pub fn split_line(line: &str) -> Result<(&str, &str), LineError> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    match fields.as_slice() {
        [digest, filename] => Ok((*digest, *filename)),
        _ => Err(LineError::FieldCount {
            found: fields.len(),
        }),
    }
}

/// Derive the platform from an artifact file name.
///
/// The name is stripped of a known extension and split on `_`; the last two
/// segments are OS and architecture.
pub fn derive_platform(filename: &str) -> Result<Platform, LineError> {
    let stem = strip_known_extension(filename);
    let segments: Vec<&str> = stem.split('_').collect();

    if segments.len() < MIN_SEGMENTS {
        return Err(LineError::Segments {
            filename: filename.to_string(),
            found: segments.len(),
        });
    }

    let arch = segments[segments.len() - 1];
    let os = segments[segments.len() - 2];
    Ok(Platform::new(os, arch))
}

fn strip_known_extension(filename: &str) -> &str {
    KNOWN_EXTENSIONS
        .iter()
        .find_map(|ext| filename.strip_suffix(ext))
        .unwrap_or(filename)
}

#[cfg(test)]
mod property_tests;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_platform_from_provider_zip() {
        let platform = derive_platform("terraform-provider-okta_1.0.0_linux_amd64.zip").unwrap();
        assert_eq!(platform, Platform::new("linux", "amd64"));
    }

    #[test]
    fn derives_platform_without_extension() {
        let platform = derive_platform("terraform-provider-okta_1.0.0_freebsd_386").unwrap();
        assert_eq!(platform, Platform::new("freebsd", "386"));
    }

    #[test]
    fn keeps_extra_leading_segments() {
        let platform =
            derive_platform("terraform-provider-my_thing_2.1.0_windows_arm64.zip").unwrap();
        assert_eq!(platform, Platform::new("windows", "arm64"));
    }

    #[test]
    fn rejects_names_with_too_few_segments() {
        let err = derive_platform("okta_linux_amd64.zip").unwrap_err();
        assert_eq!(
            err,
            LineError::Segments {
                filename: "okta_linux_amd64.zip".to_string(),
                found: 3,
            }
        );
    }

    #[test]
    fn split_line_accepts_any_whitespace() {
        assert_eq!(split_line("abc\t\tfile.zip").unwrap(), ("abc", "file.zip"));
        assert_eq!(split_line("  abc  file.zip  ").unwrap(), ("abc", "file.zip"));
    }

    #[test]
    fn split_line_rejects_wrong_field_counts() {
        assert_eq!(
            split_line("abc").unwrap_err(),
            LineError::FieldCount { found: 1 }
        );
        assert_eq!(
            split_line("abc file.zip extra").unwrap_err(),
            LineError::FieldCount { found: 3 }
        );
    }

    #[test]
    fn malformed_middle_line_is_ignored_and_order_kept() {
        let manifest = parse_manifest(
            "aaa terraform-provider-okta_1.0.0_linux_amd64.zip\n\
             bbb\n\
             ccc terraform-provider-okta_1.0.0_darwin_arm64.zip\n",
        );

        let lines: Vec<usize> = manifest.entries().iter().map(ManifestEntry::line).collect();
        assert_eq!(lines, [1, 3]);
        assert_eq!(manifest.ignored().len(), 1);
        assert_eq!(manifest.ignored()[0].line, 2);

        let digests: Vec<&str> = manifest.artifacts().map(|a| a.digest.as_str()).collect();
        assert_eq!(digests, ["aaa", "ccc"]);
    }

    #[test]
    fn duplicates_are_kept() {
        let manifest = parse_manifest(
            "aaa terraform-provider-okta_1.0.0_linux_amd64.zip\n\
             aaa terraform-provider-okta_1.0.0_linux_amd64.zip\n",
        );
        assert_eq!(manifest.artifacts().count(), 2);
    }

    #[test]
    fn blank_lines_are_not_reported() {
        let manifest = parse_manifest("\n   \naaa terraform-provider-okta_1.0.0_linux_amd64.zip\n\n");
        assert_eq!(manifest.len(), 1);
        assert!(manifest.ignored().is_empty());
        assert_eq!(manifest.entries()[0].line(), 3);
    }

    #[test]
    fn unparseable_names_stay_in_order() {
        let manifest = parse_manifest(
            "aaa terraform-provider-okta_1.0.0_manifest.json\n\
             bbb terraform-provider-okta_1.0.0_linux_amd64.zip\n",
        );
        assert!(matches!(
            &manifest.entries()[0],
            ManifestEntry::Unparseable { line: 1, .. }
        ));
        assert_eq!(
            manifest.entries()[0].filename(),
            "terraform-provider-okta_1.0.0_manifest.json"
        );
        assert_eq!(manifest.artifacts().count(), 1);
    }

    #[test]
    fn read_reports_missing_file() {
        let td = tempfile::tempdir().expect("tempdir");
        let path = td.path().join("missing_SHA256SUMS");
        let err = ChecksumManifest::read(&path).unwrap_err();
        assert!(err.to_string().contains("missing_SHA256SUMS"));
    }

    #[test]
    fn read_parses_file() {
        let td = tempfile::tempdir().expect("tempdir");
        let path = td.path().join("SHA256SUMS");
        std::fs::write(
            &path,
            "aaa terraform-provider-okta_1.0.0_linux_amd64.zip\n",
        )
        .expect("write");
        let manifest = ChecksumManifest::read(&path).expect("read");
        assert_eq!(manifest.len(), 1);
    }

    #[test]
    fn line_error_messages() {
        insta::assert_snapshot!(
            LineError::Segments {
                filename: "okta.zip".to_string(),
                found: 1,
            }
            .to_string(),
            @"cannot parse OS/arch from okta.zip: 1 segment(s), need at least 4"
        );
    }
}
