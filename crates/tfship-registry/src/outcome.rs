//! Mapping of registry status codes to outcomes.
//!
//! The "already exists" signals below are properties of the TFE API version
//! this client targets. They live here so a contract change touches one file.

use reqwest::StatusCode;
use tfship_types::EnsureOutcome;

/// Longest response body excerpt kept in diagnostics, in characters.
pub const DETAIL_LIMIT: usize = 200;

/// Status returned when a provider or key is created.
pub const CREATED: StatusCode = StatusCode::CREATED;

/// Status TFE uses to reject a duplicate provider or key.
pub const CONFLICT: StatusCode = StatusCode::UNPROCESSABLE_ENTITY;

/// Interpret the response to a provider creation request.
pub fn provider_created(status: StatusCode, body: &str) -> EnsureOutcome {
    match status {
        CREATED => EnsureOutcome::Created,
        CONFLICT => EnsureOutcome::AlreadyExists,
        other => EnsureOutcome::Unexpected {
            status: other.as_u16(),
            detail: truncate_detail(body, DETAIL_LIMIT),
        },
    }
}

/// Interpret the response to a signing key upload.
///
/// The key endpoint sometimes reports a duplicate with a different status but
/// an "already exists" message, so the body is consulted as well.
pub fn signing_key_uploaded(status: StatusCode, body: &str) -> EnsureOutcome {
    if status == StatusCode::OK || status == CREATED {
        return EnsureOutcome::Created;
    }
    if status == CONFLICT || body.to_ascii_lowercase().contains("already exists") {
        return EnsureOutcome::AlreadyExists;
    }
    EnsureOutcome::Unexpected {
        status: status.as_u16(),
        detail: truncate_detail(body, DETAIL_LIMIT),
    }
}

/// Whether a version or platform registration succeeded.
pub fn registered(status: StatusCode) -> bool {
    status == CREATED
}

/// Whether an upload to a pre-signed target succeeded.
pub fn uploaded(status: StatusCode) -> bool {
    status.is_success()
}

/// Trim a response body to at most `limit` characters for display.
pub fn truncate_detail(body: &str, limit: usize) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}
