use std::time::Instant;

use anyhow::Result;
use chrono::Utc;

use crate::config::PublishConfig;
use crate::events::EventLog;
use crate::manifest::ManifestEntry;
use crate::plan::{PublishPlan, build_plan};
use crate::registry::{RegistryError, TfeClient, outcome};
use crate::types::{
    ArtifactReceipt, EnsureOutcome, ErrorKind, EventType, ItemState, PlatformArtifact,
    PlatformReceipt, PublishReport, REPORT_VERSION, Release, RunState, UploadTarget,
};

pub trait Reporter {
    fn info(&mut self, msg: &str);
    fn warn(&mut self, msg: &str);
    fn error(&mut self, msg: &str);

    /// Called before manifest line `index` (0-based) of `total` is processed.
    fn platform_started(&mut self, _index: usize, _total: usize, _label: &str) {}

    fn platform_finished(&mut self, _state: &ItemState) {}
}

/// Publish one provider release.
///
/// Returns `Err` only when the run cannot start: the manifest, signature or
/// public key is missing. Registry failures are part of the returned report;
/// a failed version creation yields a report in [`RunState::Aborted`].
pub fn run_publish(
    config: &PublishConfig,
    client: &TfeClient,
    reporter: &mut dyn Reporter,
    events: &mut EventLog,
) -> Result<PublishReport> {
    let plan = build_plan(config)?;
    plan.preflight()?;
    let armor = plan.read_key_armor()?;

    Ok(execute(&plan, &armor, client, reporter, events))
}

/// Run the five registry steps of `plan` in order.
pub fn execute(
    plan: &PublishPlan,
    key_armor: &str,
    client: &TfeClient,
    reporter: &mut dyn Reporter,
    events: &mut EventLog,
) -> PublishReport {
    let mut run = Run::new(plan.release.clone(), client.base_url());
    let label = plan.release.label();
    let release = &plan.release;

    reporter.info(&format!("publishing {label} to {}", client.base_url()));
    events.record_now(
        EventType::RunStarted {
            version: release.version.clone(),
        },
        &label,
    );

    // 1. provider
    let provider = ensure(client.create_provider(&release.namespace, &release.provider));
    report_ensure(reporter, "provider", &release.provider, &provider);
    events.record_now(
        EventType::ProviderEnsured {
            result: provider.clone(),
        },
        &label,
    );
    run.report.provider = Some(provider);
    run.advance();

    // 2. signing key
    let key = ensure(client.upload_gpg_key(&release.namespace, key_armor));
    report_ensure(reporter, "signing key", &release.key_id, &key);
    events.record_now(EventType::SigningKeyEnsured { result: key.clone() }, &label);
    run.report.signing_key = Some(key);
    run.advance();

    // 3. version; the only step that can end the run
    let targets = match client.create_version(release) {
        Ok(targets) => targets,
        Err(err) => {
            let message = err.to_string();
            reporter.error(&format!("version {} could not be created: {message}", release.version));
            events.record_now(
                EventType::VersionFailed {
                    status: err.status(),
                    message: message.clone(),
                },
                &label,
            );
            return run.abort(message, events);
        }
    };
    reporter.info(&format!("version {} created", release.version));
    events.record_now(EventType::VersionCreated, &label);
    run.advance();

    // 4. checksum manifest, then its signature
    let checksum_files = [
        (
            release.shasums_filename(),
            &plan.shasums_path,
            &targets.shasums,
        ),
        (
            release.shasums_sig_filename(),
            &plan.shasums_sig_path,
            &targets.shasums_sig,
        ),
    ];
    for (filename, path, target) in checksum_files {
        let state = match client.upload_file(target, path) {
            Ok(()) => {
                reporter.info(&format!("uploaded {filename}"));
                events.record_now(
                    EventType::ArtifactUploaded {
                        filename: filename.clone(),
                    },
                    &filename,
                );
                ItemState::Published
            }
            Err(err) => {
                let kind = upload_error_kind(&err);
                let message = err.to_string();
                reporter.error(&format!("failed to upload {filename}: {message}"));
                events.record_now(
                    EventType::ArtifactFailed {
                        filename: filename.clone(),
                        kind,
                        message: message.clone(),
                    },
                    &filename,
                );
                ItemState::Failed { kind, message }
            }
        };
        run.report.checksums.push(ArtifactReceipt { filename, state });
    }
    run.advance();

    // 5. platforms, in manifest order
    let entries = plan.manifest.entries();
    let total = entries.len();
    for (index, entry) in entries.iter().enumerate() {
        reporter.platform_started(index, total, entry.filename());
        let started_at = Utc::now();
        let start = Instant::now();

        let (platform, state) = match entry {
            ManifestEntry::Unparseable {
                line,
                filename,
                error,
            } => {
                let reason = error.to_string();
                reporter.warn(&format!("line {line}: skipping {filename}: {reason}"));
                events.record_now(
                    EventType::PlatformSkipped {
                        line: *line,
                        reason: reason.clone(),
                    },
                    filename,
                );
                (None, ItemState::Skipped { reason })
            }
            ManifestEntry::Platform { artifact, .. } => {
                let state = publish_platform(plan, release, artifact, client, reporter, events);
                (Some(artifact.platform.clone()), state)
            }
        };

        let duration = start.elapsed();
        if let (Some(platform), ItemState::Published) = (&platform, &state) {
            events.record_now(
                EventType::PlatformPublished {
                    duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                },
                platform.to_string(),
            );
        }
        reporter.platform_finished(&state);

        run.report.platforms.push(PlatformReceipt {
            line: entry.line(),
            filename: entry.filename().to_string(),
            platform,
            state,
            started_at,
            finished_at: Utc::now(),
            duration_ms: duration.as_millis(),
        });
    }
    run.advance();

    run.finish(events)
}

/// Register one platform, then upload its binary.
fn publish_platform(
    plan: &PublishPlan,
    release: &Release,
    artifact: &PlatformArtifact,
    client: &TfeClient,
    reporter: &mut dyn Reporter,
    events: &mut EventLog,
) -> ItemState {
    let subject = artifact.platform.to_string();

    let target: UploadTarget = match client.create_platform(release, artifact) {
        Ok(target) => target,
        Err(err) => {
            let message = err.to_string();
            reporter.error(&format!(
                "failed to register {subject}: {}",
                outcome::truncate_detail(&message, outcome::DETAIL_LIMIT)
            ));
            return platform_failed(events, &subject, ErrorKind::RecoverablePerItem, message);
        }
    };
    events.record_now(
        EventType::PlatformRegistered {
            os: artifact.platform.os.clone(),
            arch: artifact.platform.arch.clone(),
        },
        &subject,
    );

    match client.upload_file(&target, &plan.binary_path(artifact)) {
        Ok(()) => {
            reporter.info(&format!("published {subject}"));
            ItemState::Published
        }
        Err(err) => {
            let kind = upload_error_kind(&err);
            let message = err.to_string();
            reporter.error(&format!("failed to upload {subject}: {message}"));
            platform_failed(events, &subject, kind, message)
        }
    }
}

fn platform_failed(
    events: &mut EventLog,
    subject: &str,
    kind: ErrorKind,
    message: String,
) -> ItemState {
    events.record_now(
        EventType::PlatformFailed {
            kind,
            message: message.clone(),
        },
        subject,
    );
    ItemState::Failed { kind, message }
}

/// Ensure calls never stop the run; a transport failure is an unexpected
/// outcome without a status.
fn ensure(result: Result<EnsureOutcome, RegistryError>) -> EnsureOutcome {
    result.unwrap_or_else(|err| EnsureOutcome::Unexpected {
        status: err.status().unwrap_or(0),
        detail: outcome::truncate_detail(&err.to_string(), outcome::DETAIL_LIMIT),
    })
}

fn report_ensure(reporter: &mut dyn Reporter, what: &str, name: &str, result: &EnsureOutcome) {
    match result {
        EnsureOutcome::Created => reporter.info(&format!("{what} {name} created")),
        EnsureOutcome::AlreadyExists => reporter.info(&format!("{what} {name} already exists")),
        EnsureOutcome::Unexpected { status: 0, detail } => {
            reporter.warn(&format!("{what} {name}: request failed: {detail}"))
        }
        EnsureOutcome::Unexpected { status, detail } => reporter.warn(&format!(
            "{what} {name}: unexpected status {status}: {detail}"
        )),
    }
}

fn upload_error_kind(err: &RegistryError) -> ErrorKind {
    match err {
        RegistryError::OpenFile { .. } => ErrorKind::RecoverablePerItem,
        _ => ErrorKind::UploadFailed,
    }
}

/// Report under construction plus the state machine driving it.
struct Run {
    report: PublishReport,
}

impl Run {
    fn new(release: Release, registry: &str) -> Self {
        let now = Utc::now();
        Self {
            report: PublishReport {
                report_version: REPORT_VERSION.to_string(),
                release,
                registry: registry.to_string(),
                started_at: now,
                finished_at: now,
                state: RunState::Init,
                provider: None,
                signing_key: None,
                checksums: Vec::new(),
                platforms: Vec::new(),
                abort_reason: None,
            },
        }
    }

    fn advance(&mut self) {
        if let Some(next) = self.report.state.next() {
            self.report.state = next;
        }
    }

    fn abort(mut self, reason: String, events: &mut EventLog) -> PublishReport {
        self.report.state = RunState::Aborted;
        self.report.abort_reason = Some(reason);
        self.finish(events)
    }

    fn finish(mut self, events: &mut EventLog) -> PublishReport {
        if self.report.state == RunState::PlatformsProcessed {
            self.advance();
        }
        self.report.finished_at = Utc::now();
        events.record_now(
            EventType::RunFinished {
                state: self.report.state,
                succeeded: self.report.succeeded_count(),
                failed: self.report.failed_count(),
            },
            self.report.release.label(),
        );
        self.report
    }
}
