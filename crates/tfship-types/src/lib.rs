//! Core domain types for tfship.
//!
//! This crate provides the types shared across the tfship crates: the release
//! being published, platforms and their artifacts, upload targets handed out by
//! the registry, the per-run state machine, and the receipts and events a run
//! produces.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Registry name used for privately published providers.
pub const PRIVATE_REGISTRY_NAME: &str = "private";

/// Plugin protocol versions announced for a new version when none are configured.
pub const DEFAULT_PROTOCOLS: &[&str] = &["5.0"];

/// Receipt format identifier written into every [`PublishReport`].
pub const REPORT_VERSION: &str = "tfship.report.v1";

/// A provider release, identified by namespace, provider name and version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    /// Registry namespace (the TFE organization)
    pub namespace: String,
    /// Provider name, e.g. `okta`
    pub provider: String,
    /// Version without any tag prefix, e.g. `1.0.0`
    pub version: String,
    /// Identifier of the signing key the checksums were signed with
    pub key_id: String,
    /// Supported plugin protocol versions
    pub protocols: Vec<String>,
}

impl Release {
    /// File name of the checksum manifest produced by the release build.
    pub fn shasums_filename(&self) -> String {
        format!(
            "terraform-provider-{}_{}_SHA256SUMS",
            self.provider, self.version
        )
    }

    /// File name of the detached signature over the checksum manifest.
    pub fn shasums_sig_filename(&self) -> String {
        format!("{}.sig", self.shasums_filename())
    }

    /// Short `namespace/provider@version` label for messages.
    pub fn label(&self) -> String {
        format!("{}/{}@{}", self.namespace, self.provider, self.version)
    }
}

/// An operating-system / architecture pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.os, self.arch)
    }
}

/// A platform binary listed in the checksum manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformArtifact {
    pub platform: Platform,
    /// Hex digest as listed in the manifest
    pub digest: String,
    /// Artifact file name relative to the artifact directory
    pub filename: String,
}

/// A pre-signed, single-use destination returned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UploadTarget(String);

impl UploadTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UploadTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Upload targets handed out when a version is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionUploadTargets {
    pub shasums: UploadTarget,
    pub shasums_sig: UploadTarget,
}

/// Progress of a single publish run.
///
/// The run moves strictly forward through these states. `VersionCreated` is
/// the only gate: failing before it ends in `Aborted`, and once past it the
/// run always reaches `Done`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Init,
    ProviderEnsured,
    KeyEnsured,
    VersionCreated,
    ChecksumsUploaded,
    PlatformsProcessed,
    Done,
    Aborted,
}

impl RunState {
    /// The state that follows this one on the success path.
    pub fn next(self) -> Option<RunState> {
        match self {
            RunState::Init => Some(RunState::ProviderEnsured),
            RunState::ProviderEnsured => Some(RunState::KeyEnsured),
            RunState::KeyEnsured => Some(RunState::VersionCreated),
            RunState::VersionCreated => Some(RunState::ChecksumsUploaded),
            RunState::ChecksumsUploaded => Some(RunState::PlatformsProcessed),
            RunState::PlatformsProcessed => Some(RunState::Done),
            RunState::Done | RunState::Aborted => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted)
    }

    /// Whether the run has passed the version-creation gate.
    pub fn past_gate(self) -> bool {
        self >= RunState::VersionCreated && self != RunState::Aborted
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Init => "init",
            RunState::ProviderEnsured => "provider_ensured",
            RunState::KeyEnsured => "key_ensured",
            RunState::VersionCreated => "version_created",
            RunState::ChecksumsUploaded => "checksums_uploaded",
            RunState::PlatformsProcessed => "platforms_processed",
            RunState::Done => "done",
            RunState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Result of an idempotent "ensure" call (provider, signing key).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EnsureOutcome {
    Created,
    AlreadyExists,
    /// The registry answered with a status this tool does not interpret.
    Unexpected { status: u16, detail: String },
}

impl EnsureOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, EnsureOutcome::Created | EnsureOutcome::AlreadyExists)
    }
}

/// Error classification for run diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Resource already exists; treated as success
    IdempotentConflict,
    /// Version creation failed; the run cannot continue
    FatalSequencing,
    /// A single item failed; the run moves on to the next one
    RecoverablePerItem,
    /// An upload to a pre-signed target was rejected or did not complete
    UploadFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::IdempotentConflict => write!(f, "idempotent-conflict"),
            ErrorKind::FatalSequencing => write!(f, "fatal-sequencing"),
            ErrorKind::RecoverablePerItem => write!(f, "recoverable-per-item"),
            ErrorKind::UploadFailed => write!(f, "upload-failed"),
        }
    }
}

/// Final state of one uploaded artifact or platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ItemState {
    Published,
    Skipped { reason: String },
    Failed { kind: ErrorKind, message: String },
}

impl ItemState {
    pub fn is_failed(&self) -> bool {
        matches!(self, ItemState::Failed { .. })
    }
}

/// Receipt for one checksum artifact upload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactReceipt {
    pub filename: String,
    pub state: ItemState,
}

/// Receipt for one checksum-manifest line processed by the platform loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformReceipt {
    /// 1-based line number in the checksum manifest
    pub line: usize,
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    pub state: ItemState,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u128,
}

/// Whether item failures after version creation fail the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartialFailurePolicy {
    /// Any failed checksum or platform upload makes the run unsuccessful
    #[default]
    Fail,
    /// The run is successful once the version exists, whatever the items did
    Allow,
}

/// Everything a publish run did, in order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReport {
    pub report_version: String,
    pub release: Release,
    /// Registry base URL the run talked to
    pub registry: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<EnsureOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<EnsureOutcome>,
    pub checksums: Vec<ArtifactReceipt>,
    pub platforms: Vec<PlatformReceipt>,
    /// Why the run stopped before `VersionCreated`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort_reason: Option<String>,
}

impl PublishReport {
    /// Platforms whose binary reached the registry, in manifest order.
    pub fn published_platforms(&self) -> Vec<Platform> {
        self.platforms
            .iter()
            .filter(|p| p.state == ItemState::Published)
            .filter_map(|p| p.platform.clone())
            .collect()
    }

    pub fn succeeded_count(&self) -> usize {
        self.platforms
            .iter()
            .filter(|p| p.state == ItemState::Published)
            .count()
    }

    /// Failed platforms plus failed checksum uploads.
    pub fn failed_count(&self) -> usize {
        let platforms = self.platforms.iter().filter(|p| p.state.is_failed()).count();
        let checksums = self.checksums.iter().filter(|c| c.state.is_failed()).count();
        platforms + checksums
    }

    pub fn skipped_count(&self) -> usize {
        self.platforms
            .iter()
            .filter(|p| matches!(p.state, ItemState::Skipped { .. }))
            .count()
    }

    /// Whether the run counts as successful under `policy`.
    pub fn is_success(&self, policy: PartialFailurePolicy) -> bool {
        if self.state != RunState::Done {
            return false;
        }
        match policy {
            PartialFailurePolicy::Fail => self.failed_count() == 0,
            PartialFailurePolicy::Allow => true,
        }
    }
}

/// Event types for the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventType {
    RunStarted { version: String },
    ProviderEnsured { result: EnsureOutcome },
    SigningKeyEnsured { result: EnsureOutcome },
    VersionCreated,
    VersionFailed { status: Option<u16>, message: String },
    ArtifactUploaded { filename: String },
    ArtifactFailed { filename: String, kind: ErrorKind, message: String },
    PlatformSkipped { line: usize, reason: String },
    PlatformRegistered { os: String, arch: String },
    PlatformPublished { duration_ms: u64 },
    PlatformFailed { kind: ErrorKind, message: String },
    RunFinished { state: RunState, succeeded: usize, failed: usize },
}

/// A publish event for the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishEvent {
    /// When the event occurred
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event_type: EventType,
    /// What the event is about: a release label, file name or platform
    pub subject: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release() -> Release {
        Release {
            namespace: "acme".to_string(),
            provider: "okta".to_string(),
            version: "1.0.0".to_string(),
            key_id: "ABCDEF0123456789".to_string(),
            protocols: vec!["5.0".to_string()],
        }
    }

    fn receipt(line: usize, state: ItemState) -> PlatformReceipt {
        PlatformReceipt {
            line,
            filename: format!("terraform-provider-okta_1.0.0_linux_{line}.zip"),
            platform: Some(Platform::new("linux", format!("arch{line}"))),
            state,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration_ms: 0,
        }
    }

    fn report(platforms: Vec<PlatformReceipt>) -> PublishReport {
        PublishReport {
            report_version: REPORT_VERSION.to_string(),
            release: release(),
            registry: "https://tfe.example.com".to_string(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            state: RunState::Done,
            provider: Some(EnsureOutcome::Created),
            signing_key: Some(EnsureOutcome::AlreadyExists),
            checksums: Vec::new(),
            platforms,
            abort_reason: None,
        }
    }

    #[test]
    fn checksum_filenames_follow_release() {
        let r = release();
        assert_eq!(r.shasums_filename(), "terraform-provider-okta_1.0.0_SHA256SUMS");
        assert_eq!(
            r.shasums_sig_filename(),
            "terraform-provider-okta_1.0.0_SHA256SUMS.sig"
        );
        assert_eq!(r.label(), "acme/okta@1.0.0");
    }

    #[test]
    fn platform_display() {
        assert_eq!(Platform::new("darwin", "arm64").to_string(), "darwin_arm64");
    }

    #[test]
    fn run_state_walks_forward_to_done() {
        let mut state = RunState::Init;
        let mut seen = vec![state];
        while let Some(next) = state.next() {
            state = next;
            seen.push(state);
        }
        assert_eq!(state, RunState::Done);
        assert_eq!(seen.len(), 7);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn run_state_gate() {
        assert!(!RunState::KeyEnsured.past_gate());
        assert!(RunState::VersionCreated.past_gate());
        assert!(RunState::Done.past_gate());
        assert!(!RunState::Aborted.past_gate());
        assert!(RunState::Aborted.is_terminal());
        assert_eq!(RunState::Aborted.next(), None);
    }

    #[test]
    fn ensure_outcome_success() {
        assert!(EnsureOutcome::Created.is_success());
        assert!(EnsureOutcome::AlreadyExists.is_success());
        assert!(
            !EnsureOutcome::Unexpected {
                status: 500,
                detail: "boom".to_string()
            }
            .is_success()
        );
    }

    #[test]
    fn report_counts_and_policy() {
        let rep = report(vec![
            receipt(1, ItemState::Published),
            receipt(
                2,
                ItemState::Failed {
                    kind: ErrorKind::RecoverablePerItem,
                    message: "422".to_string(),
                },
            ),
            receipt(
                3,
                ItemState::Skipped {
                    reason: "cannot parse".to_string(),
                },
            ),
        ]);

        assert_eq!(rep.succeeded_count(), 1);
        assert_eq!(rep.failed_count(), 1);
        assert_eq!(rep.skipped_count(), 1);
        assert_eq!(rep.published_platforms(), vec![Platform::new("linux", "arch1")]);
        assert!(!rep.is_success(PartialFailurePolicy::Fail));
        assert!(rep.is_success(PartialFailurePolicy::Allow));
    }

    #[test]
    fn failed_checksum_counts_as_failure() {
        let mut rep = report(vec![receipt(1, ItemState::Published)]);
        rep.checksums.push(ArtifactReceipt {
            filename: "terraform-provider-okta_1.0.0_SHA256SUMS".to_string(),
            state: ItemState::Failed {
                kind: ErrorKind::UploadFailed,
                message: "status 403".to_string(),
            },
        });
        assert_eq!(rep.failed_count(), 1);
        assert!(!rep.is_success(PartialFailurePolicy::Fail));
    }

    #[test]
    fn aborted_report_is_never_success() {
        let mut rep = report(Vec::new());
        rep.state = RunState::Aborted;
        assert!(!rep.is_success(PartialFailurePolicy::Allow));
    }

    #[test]
    fn item_state_serialization() {
        let state = ItemState::Failed {
            kind: ErrorKind::UploadFailed,
            message: "status 500".to_string(),
        };
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("\"state\":\"failed\""));
        assert!(json.contains("\"kind\":\"upload_failed\""));
    }

    #[test]
    fn event_serialization() {
        let event = PublishEvent {
            timestamp: Utc::now(),
            event_type: EventType::ProviderEnsured {
                result: EnsureOutcome::AlreadyExists,
            },
            subject: "acme/okta@1.0.0".to_string(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"provider_ensured\""));
        assert!(json.contains("\"outcome\":\"already_exists\""));

        let parsed: PublishEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn upload_target_is_transparent() {
        let target = UploadTarget::new("https://archivist.example.com/v1/object/abc");
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(json, "\"https://archivist.example.com/v1/object/abc\"");
    }

    #[test]
    fn error_kind_display() {
        insta::assert_snapshot!(
            [
                ErrorKind::IdempotentConflict,
                ErrorKind::FatalSequencing,
                ErrorKind::RecoverablePerItem,
                ErrorKind::UploadFailed,
            ]
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"),
            @r"
        idempotent-conflict
        fatal-sequencing
        recoverable-per-item
        upload-failed
        "
        );
    }
}
