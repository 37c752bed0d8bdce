//! Pending-edit state machine and decision validation.
//!
//! An edit moves `pending -> approved` or `pending -> rejected`, both
//! terminal. There is no re-opening: a new proposal must be submitted
//! afresh.

use serde::{Deserialize, Serialize};

use crate::delta::{touches_field, FieldDelta};
use crate::error::CoreError;

/// Status of a pending edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditStatus {
    Pending,
    Approved,
    Rejected,
}

impl EditStatus {
    /// Return the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parse a status string. Returns `None` for unknown values.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }

    /// Whether the status is terminal (immutable).
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }

    /// All valid status values.
    pub const ALL: &'static [&'static str] = &["pending", "approved", "rejected"];
}

impl std::fmt::Display for EditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields whose rejection requires an explicit reason. Price changes are
/// destructive for the seller, so a bare rejection is not accepted.
pub const REASON_REQUIRED_FIELDS: &[&str] = &["price"];

/// Validate the rejection reason against the edit's cached deltas.
///
/// A reason is mandatory when any delta touches a field listed in
/// [`REASON_REQUIRED_FIELDS`]; otherwise it is optional.
pub fn validate_reject_reason(
    deltas: &[FieldDelta],
    reason: Option<&str>,
) -> Result<(), CoreError> {
    let has_reason = reason.is_some_and(|r| !r.trim().is_empty());
    if has_reason {
        return Ok(());
    }
    for field in REASON_REQUIRED_FIELDS {
        if touches_field(deltas, field) {
            return Err(CoreError::Validation(format!(
                "Rejecting a change to '{field}' requires a reason"
            )));
        }
    }
    Ok(())
}
