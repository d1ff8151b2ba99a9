//! Event logging for tfship publish runs.
//!
//! This crate provides an append-only JSONL event log. The sequencer records
//! one event per step and per platform; the CLI flushes the log to disk when
//! asked to.
//!
//! # Example
//!
//! ```
//! use tfship_events::EventLog;
//! use tfship_types::EventType;
//!
//! let mut log = EventLog::new();
//! log.record_now(
//!     EventType::RunStarted { version: "1.0.0".to_string() },
//!     "acme/okta@1.0.0",
//! );
//! assert_eq!(log.len(), 1);
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use tfship_types::{EventType, PublishEvent};

/// Append-only event log for publish runs.
#[derive(Debug, Default)]
pub struct EventLog {
    events: Vec<PublishEvent>,
}

impl EventLog {
    /// Create a new empty event log.
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Record a new event.
    pub fn record(&mut self, event: PublishEvent) {
        self.events.push(event);
    }

    /// Record an event stamped with the current time.
    pub fn record_now(&mut self, event_type: EventType, subject: impl Into<String>) {
        self.record(PublishEvent {
            timestamp: Utc::now(),
            event_type,
            subject: subject.into(),
        });
    }

    /// Write all recorded events to a file in JSONL format.
    ///
    /// Events are appended to the file if it already exists.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create events dir {}", parent.display()))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open events file {}", path.display()))?;

        let mut writer = BufWriter::new(file);
        for event in &self.events {
            let line = serde_json::to_string(event).context("failed to serialize event to JSON")?;
            writeln!(writer, "{line}").context("failed to write event line")?;
        }
        writer.flush().context("failed to flush events file")?;

        Ok(())
    }

    /// Read all events from a JSONL file.
    pub fn read_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let file = File::open(path)
            .with_context(|| format!("failed to open events file {}", path.display()))?;

        let mut events = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.with_context(|| {
                format!("failed to read line from events file {}", path.display())
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let event: PublishEvent = serde_json::from_str(&line)
                .with_context(|| format!("failed to parse event JSON from line: {line}"))?;
            events.push(event);
        }

        Ok(Self { events })
    }

    /// Get all events about `subject`.
    pub fn events_for_subject(&self, subject: &str) -> Vec<&PublishEvent> {
        self.events.iter().filter(|e| e.subject == subject).collect()
    }

    /// Get all recorded events.
    pub fn all_events(&self) -> &[PublishEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tfship_types::{EnsureOutcome, ErrorKind, RunState};

    fn sample_events() -> Vec<(EventType, &'static str)> {
        vec![
            (
                EventType::RunStarted {
                    version: "1.0.0".to_string(),
                },
                "acme/okta@1.0.0",
            ),
            (
                EventType::ProviderEnsured {
                    result: EnsureOutcome::AlreadyExists,
                },
                "acme/okta@1.0.0",
            ),
            (
                EventType::SigningKeyEnsured {
                    result: EnsureOutcome::Unexpected {
                        status: 500,
                        detail: "oops".to_string(),
                    },
                },
                "acme/okta@1.0.0",
            ),
            (EventType::VersionCreated, "acme/okta@1.0.0"),
            (
                EventType::ArtifactFailed {
                    filename: "SHA256SUMS.sig".to_string(),
                    kind: ErrorKind::UploadFailed,
                    message: "status 403".to_string(),
                },
                "SHA256SUMS.sig",
            ),
            (
                EventType::PlatformRegistered {
                    os: "linux".to_string(),
                    arch: "amd64".to_string(),
                },
                "linux_amd64",
            ),
            (EventType::PlatformPublished { duration_ms: 12 }, "linux_amd64"),
            (
                EventType::RunFinished {
                    state: RunState::Done,
                    succeeded: 1,
                    failed: 1,
                },
                "acme/okta@1.0.0",
            ),
        ]
    }

    #[test]
    fn new_event_log_is_empty() {
        let log = EventLog::new();
        assert!(log.is_empty());
        assert_eq!(log.len(), 0);
    }

    #[test]
    fn events_for_subject_filters_correctly() {
        let mut log = EventLog::new();
        for (event_type, subject) in sample_events() {
            log.record_now(event_type, subject);
        }
        assert_eq!(log.events_for_subject("linux_amd64").len(), 2);
        assert_eq!(log.events_for_subject("acme/okta@1.0.0").len(), 5);
        assert!(log.events_for_subject("darwin_arm64").is_empty());
    }

    #[test]
    fn write_and_read_roundtrip() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join("nested/events.jsonl");

        let mut log = EventLog::new();
        for (event_type, subject) in sample_events() {
            log.record_now(event_type, subject);
        }
        log.write_to_file(&path).expect("write");

        let content = fs::read_to_string(&path).expect("read");
        assert_eq!(content.lines().count(), log.len());

        let loaded = EventLog::read_from_file(&path).expect("load");
        assert_eq!(loaded.all_events(), log.all_events());
    }

    #[test]
    fn write_to_file_appends_to_existing_file() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join("events.jsonl");

        let mut first = EventLog::new();
        first.record_now(EventType::VersionCreated, "a");
        first.write_to_file(&path).expect("write first");

        let mut second = EventLog::new();
        second.record_now(EventType::VersionCreated, "b");
        second.write_to_file(&path).expect("write second");

        let loaded = EventLog::read_from_file(&path).expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.all_events()[1].subject, "b");
    }

    #[test]
    fn read_from_file_returns_empty_log_when_missing() {
        let td = tempdir().expect("tempdir");
        let loaded = EventLog::read_from_file(&td.path().join("none.jsonl")).expect("read");
        assert!(loaded.is_empty());
    }

    #[test]
    fn read_from_file_rejects_garbage() {
        let td = tempdir().expect("tempdir");
        let path = td.path().join("events.jsonl");
        fs::write(&path, "{not json}\n").expect("write");
        assert!(EventLog::read_from_file(&path).is_err());
    }
}
