//! Row classification for bulk imports.
//!
//! Pure logic: classifying the same input twice always yields the same
//! result, and nothing here touches the canonical store. The caller supplies
//! the set of dedupe keys that already exist canonically.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::schema::{coerce_cell, is_blank, FieldSchema};

/// Hard cap on rows per batch. Larger uploads are rejected outright,
/// never silently truncated.
pub const MAX_BATCH_ROWS: usize = 5_000;

/// Preview responses return at most this many rows; counters always cover
/// the full batch.
pub const PREVIEW_DISPLAY_ROWS: usize = 50;

// ---------------------------------------------------------------------------
// Row status
// ---------------------------------------------------------------------------

/// Classification of one imported row.
///
/// `invalid` takes precedence when a row is both malformed and a duplicate;
/// the duplication is then retained on [`ClassifiedRow::also_duplicate`], so
/// a primary status of `duplicate` always implies a structurally valid row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Valid,
    Invalid,
    Duplicate,
    Empty,
}

impl RowStatus {
    /// Return the status name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "valid",
            Self::Invalid => "invalid",
            Self::Duplicate => "duplicate",
            Self::Empty => "empty",
        }
    }

    /// Parse a status string. Returns `None` for unknown values.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "valid" => Some(Self::Valid),
            "invalid" => Some(Self::Invalid),
            "duplicate" => Some(Self::Duplicate),
            "empty" => Some(Self::Empty),
            _ => None,
        }
    }

    /// All valid status values.
    pub const ALL: &'static [&'static str] = &["valid", "invalid", "duplicate", "empty"];
}

impl std::fmt::Display for RowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Classification output
// ---------------------------------------------------------------------------

/// One classified row: the raw cells as read, the typed normalized fields,
/// and the validation outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedRow {
    /// 1-based position in the source file.
    pub row_number: i32,
    pub raw: HashMap<String, String>,
    pub normalized: serde_json::Map<String, Value>,
    pub status: RowStatus,
    /// Set when the row's dedupe key collides even though the primary
    /// status is `invalid`.
    pub also_duplicate: bool,
    pub errors: Vec<String>,
}

/// Batch-level counters. `empty` rows are excluded from both the valid and
/// invalid counts.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub duplicate: usize,
    pub empty: usize,
}

/// Result of classifying a full batch.
#[derive(Debug, Clone, Serialize)]
pub struct ClassifiedBatch {
    pub rows: Vec<ClassifiedRow>,
    pub summary: BatchSummary,
    /// Batch-level notices, e.g. source columns the schema does not know.
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Dedupe key
// ---------------------------------------------------------------------------

/// Build the case/whitespace-insensitive composite dedupe key for a
/// normalized row.
///
/// Returns `None` when any identity field is missing from the normalized
/// map (the row is then malformed and cannot collide reliably).
pub fn dedupe_key(schema: &FieldSchema, normalized: &serde_json::Map<String, Value>) -> Option<String> {
    let mut parts = Vec::new();
    for spec in schema.identity_fields() {
        let value = normalized.get(spec.name)?;
        let text = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        parts.push(text.trim().to_lowercase());
    }
    if parts.is_empty() {
        return None;
    }
    // Unit separator keeps composite keys unambiguous.
    Some(parts.join("\u{1f}"))
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Classify every row of a batch against the schema and the given set of
/// canonical dedupe keys.
///
/// Fails with [`CoreError::Validation`] when the batch exceeds
/// [`MAX_BATCH_ROWS`].
pub fn classify_batch(
    rows: &[HashMap<String, String>],
    schema: &FieldSchema,
    existing_keys: &HashSet<String>,
) -> Result<ClassifiedBatch, CoreError> {
    if rows.len() > MAX_BATCH_ROWS {
        return Err(CoreError::Validation(format!(
            "Batch has {} rows; the maximum is {MAX_BATCH_ROWS}",
            rows.len()
        )));
    }

    let mut classified = Vec::with_capacity(rows.len());
    let mut summary = BatchSummary {
        total: rows.len(),
        ..BatchSummary::default()
    };
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut unknown_columns: Vec<String> = Vec::new();

    for (index, raw) in rows.iter().enumerate() {
        let row_number = (index + 1) as i32;

        for column in raw.keys() {
            if schema.field(column).is_none() && !unknown_columns.contains(column) {
                unknown_columns.push(column.clone());
            }
        }

        let row = classify_row(row_number, raw, schema, &mut seen_keys, existing_keys);
        match row.status {
            RowStatus::Valid => summary.valid += 1,
            RowStatus::Invalid => summary.invalid += 1,
            RowStatus::Duplicate => summary.duplicate += 1,
            RowStatus::Empty => summary.empty += 1,
        }
        classified.push(row);
    }

    let mut warnings = Vec::new();
    if !unknown_columns.is_empty() {
        unknown_columns.sort();
        warnings.push(format!(
            "Ignored columns not in the {} schema: {}",
            schema.entity,
            unknown_columns.join(", ")
        ));
    }

    Ok(ClassifiedBatch {
        rows: classified,
        summary,
        warnings,
    })
}

/// Classify a single row. Valid rows register their dedupe key in
/// `seen_keys` so later rows in the same batch collide against them.
fn classify_row(
    row_number: i32,
    raw: &HashMap<String, String>,
    schema: &FieldSchema,
    seen_keys: &mut HashSet<String>,
    existing_keys: &HashSet<String>,
) -> ClassifiedRow {
    // A row whose every known cell is blank is empty, not invalid.
    let all_blank = schema
        .fields
        .iter()
        .all(|spec| raw.get(spec.name).is_none_or(|v| is_blank(v)));
    if all_blank {
        return ClassifiedRow {
            row_number,
            raw: raw.clone(),
            normalized: serde_json::Map::new(),
            status: RowStatus::Empty,
            also_duplicate: false,
            errors: Vec::new(),
        };
    }

    let mut normalized = serde_json::Map::new();
    let mut errors = Vec::new();

    for spec in &schema.fields {
        let cell = raw.get(spec.name).map(String::as_str).unwrap_or("");
        if is_blank(cell) {
            if spec.required {
                errors.push(format!("missing required field '{}'", spec.name));
            }
            continue;
        }
        match coerce_cell(spec.kind, cell) {
            Ok(value) => {
                normalized.insert(spec.name.to_string(), value);
            }
            Err(e) => errors.push(format!("field '{}': {e}", spec.name)),
        }
    }

    let key = dedupe_key(schema, &normalized);
    let collides = key
        .as_ref()
        .is_some_and(|k| seen_keys.contains(k) || existing_keys.contains(k));

    let (status, also_duplicate) = if !errors.is_empty() {
        (RowStatus::Invalid, collides)
    } else if collides {
        (RowStatus::Duplicate, false)
    } else {
        if let Some(k) = key {
            seen_keys.insert(k);
        }
        (RowStatus::Valid, false)
    };

    ClassifiedRow {
        row_number,
        raw: raw.clone(),
        normalized,
        status,
        also_duplicate,
        errors,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{schema_for, EntityKind};

    fn row(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn listing_row(title: &str, city: &str, price: &str) -> HashMap<String, String> {
        row(&[("title", title), ("city", city), ("price", price)])
    }

    #[test]
    fn well_formed_rows_are_valid() {
        let schema = schema_for(EntityKind::Listing);
        let rows = vec![
            listing_row("3 room flat", "Haifa", "1,800,000"),
            listing_row("Garden house", "Haifa", "2,400,000"),
        ];
        let batch = classify_batch(&rows, &schema, &HashSet::new()).unwrap();
        assert_eq!(batch.summary.valid, 2);
        assert_eq!(batch.summary.invalid, 0);
        assert!(batch.rows.iter().all(|r| r.status == RowStatus::Valid));
    }

    #[test]
    fn missing_required_city_reported_by_name() {
        // Three rows, the middle one missing its city.
        let schema = schema_for(EntityKind::Listing);
        let rows = vec![
            listing_row("A", "Haifa", "100"),
            listing_row("B", "", "200"),
            listing_row("C", "Haifa", "300"),
        ];
        let batch = classify_batch(&rows, &schema, &HashSet::new()).unwrap();
        assert_eq!(batch.summary.valid, 2);
        assert_eq!(batch.summary.invalid, 1);
        let bad = &batch.rows[1];
        assert_eq!(bad.status, RowStatus::Invalid);
        assert!(bad.errors.iter().any(|e| e.contains("'city'")));
    }

    #[test]
    fn every_failing_field_is_listed() {
        let schema = schema_for(EntityKind::Listing);
        let rows = vec![listing_row("A", "", "expensive")];
        let batch = classify_batch(&rows, &schema, &HashSet::new()).unwrap();
        let bad = &batch.rows[0];
        assert_eq!(bad.errors.len(), 2);
        assert!(bad.errors.iter().any(|e| e.contains("'city'")));
        assert!(bad.errors.iter().any(|e| e.contains("'price'")));
    }

    #[test]
    fn blank_row_is_empty_not_invalid() {
        let schema = schema_for(EntityKind::Listing);
        let rows = vec![
            listing_row("A", "Haifa", "100"),
            listing_row("", "", ""),
        ];
        let batch = classify_batch(&rows, &schema, &HashSet::new()).unwrap();
        assert_eq!(batch.summary.valid, 1);
        assert_eq!(batch.summary.invalid, 0);
        assert_eq!(batch.summary.empty, 1);
        assert_eq!(batch.rows[1].status, RowStatus::Empty);
        assert!(batch.rows[1].errors.is_empty());
    }

    #[test]
    fn duplicate_within_batch_case_and_whitespace_insensitive() {
        let schema = schema_for(EntityKind::Listing);
        let rows = vec![
            listing_row("Sea View", "Haifa", "100"),
            listing_row("  sea view ", "HAIFA", "200"),
        ];
        let batch = classify_batch(&rows, &schema, &HashSet::new()).unwrap();
        assert_eq!(batch.rows[0].status, RowStatus::Valid);
        assert_eq!(batch.rows[1].status, RowStatus::Duplicate);
        assert_eq!(batch.summary.duplicate, 1);
    }

    #[test]
    fn duplicate_against_canonical_keys() {
        let schema = schema_for(EntityKind::Listing);
        let existing: HashSet<String> =
            [dedupe_key(&schema, &serde_json::json!({"title": "Sea View", "city": "Haifa"}).as_object().unwrap().clone()).unwrap()]
                .into_iter()
                .collect();
        let rows = vec![listing_row("Sea View", "Haifa", "100")];
        let batch = classify_batch(&rows, &schema, &existing).unwrap();
        assert_eq!(batch.rows[0].status, RowStatus::Duplicate);
    }

    #[test]
    fn invalid_wins_over_duplicate_with_secondary_flag() {
        let schema = schema_for(EntityKind::Listing);
        let rows = vec![
            listing_row("Sea View", "Haifa", "100"),
            // Same identity, but the price is malformed.
            listing_row("Sea View", "Haifa", "lots"),
        ];
        let batch = classify_batch(&rows, &schema, &HashSet::new()).unwrap();
        let second = &batch.rows[1];
        assert_eq!(second.status, RowStatus::Invalid);
        assert!(second.also_duplicate);
        assert_eq!(batch.summary.duplicate, 0);
    }

    #[test]
    fn duplicate_rows_do_not_seed_the_seen_set() {
        // Three identical rows: one valid, two duplicates (not chained).
        let schema = schema_for(EntityKind::Listing);
        let rows = vec![
            listing_row("X", "Haifa", "1"),
            listing_row("X", "Haifa", "2"),
            listing_row("X", "Haifa", "3"),
        ];
        let batch = classify_batch(&rows, &schema, &HashSet::new()).unwrap();
        assert_eq!(batch.summary.valid, 1);
        assert_eq!(batch.summary.duplicate, 2);
    }

    #[test]
    fn classification_is_repeatable() {
        let schema = schema_for(EntityKind::Listing);
        let rows = vec![
            listing_row("A", "Haifa", "100"),
            listing_row("A", "Haifa", "100"),
        ];
        let first = classify_batch(&rows, &schema, &HashSet::new()).unwrap();
        let second = classify_batch(&rows, &schema, &HashSet::new()).unwrap();
        let statuses = |b: &ClassifiedBatch| b.rows.iter().map(|r| r.status).collect::<Vec<_>>();
        assert_eq!(statuses(&first), statuses(&second));
    }

    #[test]
    fn unknown_columns_produce_a_warning() {
        let schema = schema_for(EntityKind::Listing);
        let rows = vec![row(&[("title", "A"), ("city", "Haifa"), ("price", "1"), ("agent", "Dana")])];
        let batch = classify_batch(&rows, &schema, &HashSet::new()).unwrap();
        assert_eq!(batch.rows[0].status, RowStatus::Valid);
        assert!(batch.warnings[0].contains("agent"));
    }

    #[test]
    fn oversized_batch_rejected_outright() {
        let schema = schema_for(EntityKind::City);
        let rows: Vec<_> = (0..MAX_BATCH_ROWS + 1)
            .map(|i| {
                let name = format!("city-{i}");
                row(&[("name", name.as_str())])
            })
            .collect();
        let err = classify_batch(&rows, &schema, &HashSet::new()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn status_round_trip() {
        for s in RowStatus::ALL {
            let status = RowStatus::from_str(s).unwrap();
            assert_eq!(status.as_str(), *s);
        }
    }
}
