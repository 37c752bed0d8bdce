//! Field-level diff engine.
//!
//! Computes the deltas between a canonical entity snapshot and a proposed
//! version, driven entirely by the entity's [`FieldSchema`] instead of
//! per-field branches. Only fields present in the proposed map participate:
//! a submitter sends just the fields they intend to change.
//!
//! `compute_delta` is deterministic (schema field order, nested keys sorted)
//! and side-effect free; diffing a snapshot against itself always yields an
//! empty sequence.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::{FieldKind, FieldSchema};

// ---------------------------------------------------------------------------
// Change kinds and deltas
// ---------------------------------------------------------------------------

/// How a delta was produced, which also tells the applier how to write it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Scalar,
    NestedMap,
    ImageSet,
    FeatureMap,
}

impl ChangeKind {
    /// String representation for display, logging, and database storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::NestedMap => "nested_map",
            Self::ImageSet => "image_set",
            Self::FeatureMap => "feature_map",
        }
    }
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One computed difference between canonical and proposed.
///
/// `field_path` is dot-addressed (`attributes.floor`, `features.balcony`);
/// the reserved path `images` carries the coarse image-set delta. A `None`
/// value means the field or key is absent on that side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDelta {
    pub field_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    pub change_kind: ChangeKind,
}

/// Whether any delta targets the given top-level field.
pub fn touches_field(deltas: &[FieldDelta], field: &str) -> bool {
    deltas
        .iter()
        .any(|d| d.field_path == field || d.field_path.starts_with(&format!("{field}.")))
}

// ---------------------------------------------------------------------------
// Delta computation
// ---------------------------------------------------------------------------

/// Compute the ordered field deltas between a canonical snapshot and a
/// proposed field map.
pub fn compute_delta(
    canonical: &serde_json::Map<String, Value>,
    proposed: &serde_json::Map<String, Value>,
    schema: &FieldSchema,
) -> Vec<FieldDelta> {
    let mut deltas = Vec::new();

    for spec in &schema.fields {
        let Some(new_value) = proposed.get(spec.name) else {
            continue;
        };
        let old_value = canonical.get(spec.name);

        match spec.kind {
            FieldKind::Text
            | FieldKind::Integer
            | FieldKind::Boolean
            | FieldKind::Date => {
                diff_scalar(spec.name, old_value, new_value, &mut deltas);
            }
            FieldKind::AttributeMap => {
                diff_nested_map(spec.name, old_value, new_value, &mut deltas);
            }
            FieldKind::ImageSet => {
                diff_image_set(spec.name, old_value, new_value, &mut deltas);
            }
            FieldKind::FeatureMap => {
                diff_feature_map(spec.name, old_value, new_value, &mut deltas);
            }
        }
    }

    deltas
}

/// `null` and absent both mean "no value" on either side.
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

fn diff_scalar(
    path: &str,
    old_value: Option<&Value>,
    new_value: &Value,
    deltas: &mut Vec<FieldDelta>,
) {
    let old = present(old_value);
    let new = present(Some(new_value));
    if old != new {
        deltas.push(FieldDelta {
            field_path: path.to_string(),
            old_value: old.cloned(),
            new_value: new.cloned(),
            change_kind: ChangeKind::Scalar,
        });
    }
}

/// Recurse key-by-key over the union of keys on either side. A key present
/// on only one side is reported with the other side absent; unchanged
/// subtrees yield nothing.
fn diff_nested_map(
    path: &str,
    old_value: Option<&Value>,
    new_value: &Value,
    deltas: &mut Vec<FieldDelta>,
) {
    let old_map = present(old_value).and_then(Value::as_object).unwrap_or(empty_map());
    let new_map = present(Some(new_value))
        .and_then(Value::as_object)
        .unwrap_or(empty_map());

    let keys: BTreeSet<&String> = old_map.keys().chain(new_map.keys()).collect();
    for key in keys {
        let child_path = format!("{path}.{key}");
        let old_child = present(old_map.get(key));
        let new_child = present(new_map.get(key));
        match (old_child, new_child) {
            (Some(o), Some(n)) if o.is_object() && n.is_object() => {
                diff_nested_map(&child_path, Some(o), n, deltas);
            }
            (o, n) if o != n => deltas.push(FieldDelta {
                field_path: child_path,
                old_value: o.cloned(),
                new_value: n.cloned(),
                change_kind: ChangeKind::NestedMap,
            }),
            _ => {}
        }
    }
}

/// Compare image arrays as sets of URLs, order-insensitive. Any membership
/// or size difference yields exactly one coarse delta carrying both full
/// arrays; item-level diffing has no semantic meaning to a reviewer.
fn diff_image_set(
    path: &str,
    old_value: Option<&Value>,
    new_value: &Value,
    deltas: &mut Vec<FieldDelta>,
) {
    let as_set = |v: Option<&Value>| -> BTreeSet<String> {
        present(v)
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    };

    let old_set = as_set(old_value);
    let new_set = as_set(Some(new_value));
    let old_len = present(old_value)
        .and_then(Value::as_array)
        .map_or(0, Vec::len);
    let new_len = present(Some(new_value))
        .and_then(Value::as_array)
        .map_or(0, Vec::len);

    if old_set != new_set || old_len != new_len {
        deltas.push(FieldDelta {
            field_path: path.to_string(),
            old_value: present(old_value).cloned(),
            new_value: present(Some(new_value)).cloned(),
            change_kind: ChangeKind::ImageSet,
        });
    }
}

/// Each differing toggle is its own delta: unlike images, every feature is
/// independently meaningful to a reviewer.
fn diff_feature_map(
    path: &str,
    old_value: Option<&Value>,
    new_value: &Value,
    deltas: &mut Vec<FieldDelta>,
) {
    let old_map = present(old_value).and_then(Value::as_object).unwrap_or(empty_map());
    let new_map = present(Some(new_value))
        .and_then(Value::as_object)
        .unwrap_or(empty_map());

    let keys: BTreeSet<&String> = old_map.keys().chain(new_map.keys()).collect();
    for key in keys {
        let old_child = present(old_map.get(key));
        let new_child = present(new_map.get(key));
        if old_child != new_child {
            deltas.push(FieldDelta {
                field_path: format!("{path}.{key}"),
                old_value: old_child.cloned(),
                new_value: new_child.cloned(),
                change_kind: ChangeKind::FeatureMap,
            });
        }
    }
}

/// Shared empty JSON map for sides that have no value.
fn empty_map() -> &'static serde_json::Map<String, Value> {
    static MAP: std::sync::OnceLock<serde_json::Map<String, Value>> = std::sync::OnceLock::new();
    MAP.get_or_init(serde_json::Map::new)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{schema_for, EntityKind};
    use serde_json::json;

    fn map(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    fn listing() -> serde_json::Map<String, Value> {
        map(json!({
            "title": "Sea View",
            "city": "Haifa",
            "price": 1_800_000,
            "attributes": {"floor": 3, "condition": "renovated"},
            "images": ["https://img/a.jpg", "https://img/b.jpg", "https://img/c.jpg"],
            "features": {"balcony": true, "parking": false},
        }))
    }

    #[test]
    fn identical_snapshots_yield_no_deltas() {
        let schema = schema_for(EntityKind::Listing);
        let snapshot = listing();
        assert!(compute_delta(&snapshot, &snapshot, &schema).is_empty());
    }

    #[test]
    fn scalar_change_produces_one_delta() {
        let schema = schema_for(EntityKind::Listing);
        let canonical = listing();
        let proposed = map(json!({"price": 1_750_000}));
        let deltas = compute_delta(&canonical, &proposed, &schema);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].field_path, "price");
        assert_eq!(deltas[0].change_kind, ChangeKind::Scalar);
        assert_eq!(deltas[0].old_value, Some(json!(1_800_000)));
        assert_eq!(deltas[0].new_value, Some(json!(1_750_000)));
    }

    #[test]
    fn unchanged_proposed_fields_yield_nothing() {
        let schema = schema_for(EntityKind::Listing);
        let canonical = listing();
        let proposed = map(json!({"price": 1_800_000, "title": "Sea View"}));
        assert!(compute_delta(&canonical, &proposed, &schema).is_empty());
    }

    #[test]
    fn symmetry_swaps_old_and_new() {
        let schema = schema_for(EntityKind::Listing);
        let a = listing();
        let mut b = listing();
        b.insert("price".to_string(), json!(1_750_000));
        b.insert("title".to_string(), json!("Sea View Penthouse"));
        b.insert(
            "attributes".to_string(),
            json!({"floor": 4, "condition": "renovated"}),
        );

        let forward = compute_delta(&a, &b, &schema);
        let backward = compute_delta(&b, &a, &schema);

        let paths = |d: &[FieldDelta]| {
            d.iter().map(|x| x.field_path.clone()).collect::<BTreeSet<_>>()
        };
        assert_eq!(paths(&forward), paths(&backward));
        for f in &forward {
            let back = backward
                .iter()
                .find(|b| b.field_path == f.field_path)
                .unwrap();
            assert_eq!(f.old_value, back.new_value);
            assert_eq!(f.new_value, back.old_value);
        }
    }

    // -- nested attribute maps ------------------------------------------------

    #[test]
    fn nested_map_diffs_key_by_key() {
        let schema = schema_for(EntityKind::Listing);
        let canonical = listing();
        let proposed = map(json!({
            "attributes": {"floor": 4, "condition": "renovated", "heating": "gas"}
        }));
        let deltas = compute_delta(&canonical, &proposed, &schema);
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].field_path, "attributes.floor");
        assert_eq!(deltas[0].old_value, Some(json!(3)));
        assert_eq!(deltas[0].new_value, Some(json!(4)));
        assert_eq!(deltas[1].field_path, "attributes.heating");
        assert_eq!(deltas[1].old_value, None);
        assert_eq!(deltas[1].new_value, Some(json!("gas")));
    }

    #[test]
    fn nested_map_reports_removed_keys_as_absent() {
        let schema = schema_for(EntityKind::Listing);
        let canonical = listing();
        let proposed = map(json!({"attributes": {"floor": 3}}));
        let deltas = compute_delta(&canonical, &proposed, &schema);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].field_path, "attributes.condition");
        assert_eq!(deltas[0].old_value, Some(json!("renovated")));
        assert_eq!(deltas[0].new_value, None);
    }

    #[test]
    fn deeply_nested_subtrees_recurse() {
        let schema = schema_for(EntityKind::Listing);
        let canonical = map(json!({"attributes": {"size": {"rooms": 3, "sqm": 80}}}));
        let proposed = map(json!({"attributes": {"size": {"rooms": 4, "sqm": 80}}}));
        let deltas = compute_delta(&canonical, &proposed, &schema);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].field_path, "attributes.size.rooms");
    }

    // -- image sets -----------------------------------------------------------

    #[test]
    fn reordered_images_yield_zero_deltas() {
        let schema = schema_for(EntityKind::Listing);
        let canonical = listing();
        let proposed = map(json!({
            "images": ["https://img/c.jpg", "https://img/a.jpg", "https://img/b.jpg"]
        }));
        assert!(compute_delta(&canonical, &proposed, &schema).is_empty());
    }

    #[test]
    fn changed_image_yields_one_coarse_delta_with_both_arrays() {
        let schema = schema_for(EntityKind::Listing);
        let canonical = listing();
        let proposed = map(json!({
            "images": ["https://img/a.jpg", "https://img/b.jpg", "https://img/d.jpg"]
        }));
        let deltas = compute_delta(&canonical, &proposed, &schema);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].field_path, "images");
        assert_eq!(deltas[0].change_kind, ChangeKind::ImageSet);
        assert_eq!(
            deltas[0].old_value,
            Some(json!(["https://img/a.jpg", "https://img/b.jpg", "https://img/c.jpg"]))
        );
        assert_eq!(
            deltas[0].new_value,
            Some(json!(["https://img/a.jpg", "https://img/b.jpg", "https://img/d.jpg"]))
        );
    }

    #[test]
    fn duplicate_image_entries_change_size_and_are_detected() {
        let schema = schema_for(EntityKind::Listing);
        let canonical = map(json!({"images": ["https://img/a.jpg"]}));
        let proposed = map(json!({"images": ["https://img/a.jpg", "https://img/a.jpg"]}));
        let deltas = compute_delta(&canonical, &proposed, &schema);
        assert_eq!(deltas.len(), 1);
    }

    // -- feature maps ---------------------------------------------------------

    #[test]
    fn each_changed_toggle_is_its_own_delta() {
        let schema = schema_for(EntityKind::Listing);
        let canonical = listing();
        let proposed = map(json!({
            "features": {"balcony": false, "parking": false, "elevator": true}
        }));
        let deltas = compute_delta(&canonical, &proposed, &schema);
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].field_path, "features.balcony");
        assert_eq!(deltas[0].change_kind, ChangeKind::FeatureMap);
        assert_eq!(deltas[1].field_path, "features.elevator");
        assert_eq!(deltas[1].old_value, None);
        assert_eq!(deltas[1].new_value, Some(json!(true)));
    }

    #[test]
    fn feature_union_covers_keys_on_either_side() {
        let schema = schema_for(EntityKind::Listing);
        let canonical = listing();
        // Proposed map omits "parking": the union still reports its removal.
        let proposed = map(json!({"features": {"balcony": true}}));
        let deltas = compute_delta(&canonical, &proposed, &schema);
        assert_eq!(deltas.len(), 1);
        assert_eq!(deltas[0].field_path, "features.parking");
        assert_eq!(deltas[0].old_value, Some(json!(false)));
        assert_eq!(deltas[0].new_value, None);
    }

    // -- helpers --------------------------------------------------------------

    #[test]
    fn touches_field_matches_roots_and_children() {
        let deltas = vec![FieldDelta {
            field_path: "attributes.floor".to_string(),
            old_value: None,
            new_value: Some(json!(2)),
            change_kind: ChangeKind::NestedMap,
        }];
        assert!(touches_field(&deltas, "attributes"));
        assert!(!touches_field(&deltas, "attr"));
        assert!(!touches_field(&deltas, "price"));
    }

    #[test]
    fn delta_serde_round_trip() {
        let delta = FieldDelta {
            field_path: "price".to_string(),
            old_value: Some(json!(1_800_000)),
            new_value: Some(json!(1_750_000)),
            change_kind: ChangeKind::Scalar,
        };
        let encoded = serde_json::to_string(&delta).unwrap();
        let decoded: FieldDelta = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, delta);
    }

    #[test]
    fn absent_sides_omit_value_keys_in_json() {
        let delta = FieldDelta {
            field_path: "attributes.heating".to_string(),
            old_value: None,
            new_value: Some(json!("gas")),
            change_kind: ChangeKind::NestedMap,
        };
        let encoded = serde_json::to_value(&delta).unwrap();
        assert!(encoded.get("old_value").is_none());
    }
}
