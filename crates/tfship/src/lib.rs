//! # tfship
//!
//! Publishes a Terraform provider release to a Terraform Enterprise private
//! registry.
//!
//! A release build leaves a checksum manifest, its detached signature, an
//! armored public key and one zip per platform in an artifact directory.
//! tfship turns those into registry state with a fixed sequence of calls:
//!
//! 1. ensure the provider exists (an existing provider is fine)
//! 2. ensure the signing key exists (an existing key is fine)
//! 3. create the version; failure here aborts the run
//! 4. upload the checksum manifest, then its signature
//! 5. for every manifest line, in order: register the platform and upload its
//!    binary
//!
//! Item failures in steps 4 and 5 are recorded and the run moves on. Whether
//! they fail the run overall is decided by
//! [`types::PartialFailurePolicy`].
//!
//! ## Example
//!
//! ```no_run
//! use tfship::{config, engine, events::EventLog};
//!
//! struct Stderr;
//!
//! impl engine::Reporter for Stderr {
//!     fn info(&mut self, msg: &str) { eprintln!("[info] {msg}"); }
//!     fn warn(&mut self, msg: &str) { eprintln!("[warn] {msg}"); }
//!     fn error(&mut self, msg: &str) { eprintln!("[error] {msg}"); }
//! }
//!
//! # fn main() -> anyhow::Result<()> {
//! let inputs = config::ConfigInputs {
//!     organization: Some("acme".into()),
//!     provider: Some("okta".into()),
//!     key_id: Some("34365D9472D7468F".into()),
//!     token: Some("token".into()),
//!     ..Default::default()
//! };
//! let cfg = config::resolve("1.0.0", inputs, &config::TfshipConfig::default())?;
//! let client = cfg.client()?;
//! let mut events = EventLog::new();
//! let report = engine::run_publish(&cfg, &client, &mut Stderr, &mut events)?;
//! println!("{} succeeded, {} failed", report.succeeded_count(), report.failed_count());
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: `PublishConfig` and the `.tfship.toml` file
//! - [`plan`]: offline view of a release and preflight checks
//! - [`engine`]: the publish sequence and the `Reporter` trait
//! - [`receipt`]: JSON report persistence

/// Token resolution: `TFE_TOKEN` → `TF_TOKEN_<host>` → `credentials.tfrc.json`.
pub use tfship_auth as auth;

/// Run configuration and config file loading.
pub mod config;

/// Publish sequencing.
pub mod engine;

/// Append-only JSONL event log.
pub use tfship_events as events;

/// Checksum manifest parsing.
pub use tfship_manifest as manifest;

/// Release layout and preflight checks.
pub mod plan;

/// Receipt persistence.
pub mod receipt;

/// TFE registry API client.
pub use tfship_registry as registry;

/// Domain types: releases, platforms, outcomes, reports and events.
pub use tfship_types as types;
