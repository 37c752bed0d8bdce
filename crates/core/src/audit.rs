//! Audit logging constants and utility functions.
//!
//! This module lives in `core` (zero internal deps) so it can be used by both
//! the API/repository layer and any future worker or CLI tooling. Every
//! mutating pipeline operation writes exactly one audit entry; entries are
//! immutable and chained by a SHA-256 integrity hash.

use crate::hashing;

// ---------------------------------------------------------------------------
// Action type constants
// ---------------------------------------------------------------------------

/// Known action types for audit log entries.
pub mod action_types {
    pub const IMPORT_PREVIEW: &str = "import_preview";
    pub const IMPORT_COMMIT: &str = "import_commit";
    pub const IMPORT_DISCARD: &str = "import_discard";
    pub const EDIT_SUBMIT: &str = "edit_submit";
    pub const EDIT_APPROVE: &str = "edit_approve";
    pub const EDIT_REJECT: &str = "edit_reject";
    pub const ENTITY_CREATE: &str = "entity_create";
    pub const ENTITY_UPDATE: &str = "entity_update";
    pub const ENTITY_DELETE: &str = "entity_delete";
}

// ---------------------------------------------------------------------------
// Integrity hash computation
// ---------------------------------------------------------------------------

/// Known seed value for the first entry in the hash chain.
const CHAIN_SEED: &str = "AUDIT_LOG_CHAIN_SEED_V1";

/// Compute the SHA-256 integrity hash for an audit log entry.
///
/// `prev_hash` is the integrity hash of the previous entry, or `None` for the
/// first entry in the chain (which uses a known seed value).
///
/// `entry_data` is a canonical string representation of the entry's content
/// (typically the JSON-serialized entry fields).
pub fn compute_integrity_hash(prev_hash: Option<&str>, entry_data: &str) -> String {
    let prev = prev_hash.unwrap_or(CHAIN_SEED);
    let combined = format!("{prev}|{entry_data}");
    hashing::sha256_hex(combined.as_bytes())
}

// ---------------------------------------------------------------------------
// Sensitive field redaction
// ---------------------------------------------------------------------------

/// Fields that should be redacted from audit log details before storage.
pub const SENSITIVE_FIELDS: &[&str] = &[
    "password",
    "token",
    "secret",
    "access_token",
    "refresh_token",
    "api_key",
    "authorization",
    "credential",
];

/// Redact sensitive fields from a JSON value.
///
/// Replaces the value of any key matching [`SENSITIVE_FIELDS`] with
/// `"[REDACTED]"`. Returns a new `serde_json::Value` with redactions applied.
pub fn redact_sensitive_fields(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut redacted = serde_json::Map::new();
            for (key, val) in map {
                let lower_key = key.to_lowercase();
                if SENSITIVE_FIELDS.iter().any(|f| lower_key.contains(f)) {
                    redacted.insert(
                        key.clone(),
                        serde_json::Value::String("[REDACTED]".to_string()),
                    );
                } else {
                    redacted.insert(key.clone(), redact_sensitive_fields(val));
                }
            }
            serde_json::Value::Object(redacted)
        }
        serde_json::Value::Array(arr) => {
            serde_json::Value::Array(arr.iter().map(redact_sensitive_fields).collect())
        }
        other => other.clone(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
