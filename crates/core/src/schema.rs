//! Per-entity field schemas and value coercion for the import/moderation
//! pipeline.
//!
//! A [`FieldSchema`] declares, for one canonical entity kind, which fields
//! exist, how raw spreadsheet cells are coerced into typed JSON values, which
//! fields are required, and which fields form the identity (dedupe) key.
//! Both the row validator and the diff engine are parameterized by these
//! schemas instead of hand-written per-field branches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reserved field name for the image URL array.
pub const IMAGES_FIELD: &str = "images";

/// Reserved field name for the arbitrary attribute map.
pub const ATTRIBUTES_FIELD: &str = "attributes";

/// Reserved field name for the boolean feature map.
pub const FEATURES_FIELD: &str = "features";

// ---------------------------------------------------------------------------
// Entity kinds
// ---------------------------------------------------------------------------

/// Canonical entity kinds the pipeline can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Listing,
    City,
    Street,
}

impl EntityKind {
    /// Return the kind name as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::City => "city",
            Self::Street => "street",
        }
    }

    /// Parse a kind string. Returns `None` for unknown values.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "listing" => Some(Self::Listing),
            "city" => Some(Self::City),
            "street" => Some(Self::Street),
            _ => None,
        }
    }

    /// All valid kind values.
    pub const ALL: &'static [&'static str] = &["listing", "city", "street"];
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Field kinds and specs
// ---------------------------------------------------------------------------

/// How a field's value is typed, coerced, and diffed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// Free text.
    Text,
    /// Whole number; raw cells may carry group separators (`1,800,000`).
    Integer,
    /// Boolean; raw cells use localized yes/no tokens.
    Boolean,
    /// Calendar date, stored as ISO `YYYY-MM-DD`.
    Date,
    /// Arbitrary string-to-scalar map, diffed key-by-key.
    AttributeMap,
    /// Array of image URLs, diffed as an order-insensitive set.
    ImageSet,
    /// String-to-bool map, each toggle diffed independently.
    FeatureMap,
}

/// Declaration of one field within an entity schema.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    /// Rows missing this field are classified invalid.
    pub required: bool,
    /// Identity fields form the case/whitespace-insensitive dedupe key.
    pub identity: bool,
}

/// The full field schema for one entity kind.
///
/// Field order is significant: classification errors and computed deltas
/// follow it, which keeps output deterministic.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub entity: EntityKind,
    pub fields: Vec<FieldSpec>,
}

impl FieldSchema {
    /// Look up a field spec by name.
    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Names of the identity fields, in schema order.
    pub fn identity_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.identity)
    }
}

/// Return the field schema for an entity kind.
pub fn schema_for(kind: EntityKind) -> FieldSchema {
    match kind {
        EntityKind::Listing => listing_schema(),
        EntityKind::City => city_schema(),
        EntityKind::Street => street_schema(),
    }
}

fn listing_schema() -> FieldSchema {
    FieldSchema {
        entity: EntityKind::Listing,
        fields: vec![
            FieldSpec { name: "title", kind: FieldKind::Text, required: true, identity: true },
            FieldSpec { name: "city", kind: FieldKind::Text, required: true, identity: true },
            FieldSpec { name: "street", kind: FieldKind::Text, required: false, identity: false },
            FieldSpec { name: "price", kind: FieldKind::Integer, required: true, identity: false },
            FieldSpec { name: "description", kind: FieldKind::Text, required: false, identity: false },
            FieldSpec { name: "available_from", kind: FieldKind::Date, required: false, identity: false },
            FieldSpec { name: ATTRIBUTES_FIELD, kind: FieldKind::AttributeMap, required: false, identity: false },
            FieldSpec { name: IMAGES_FIELD, kind: FieldKind::ImageSet, required: false, identity: false },
            FieldSpec { name: FEATURES_FIELD, kind: FieldKind::FeatureMap, required: false, identity: false },
        ],
    }
}

fn city_schema() -> FieldSchema {
    FieldSchema {
        entity: EntityKind::City,
        fields: vec![FieldSpec { name: "name", kind: FieldKind::Text, required: true, identity: true }],
    }
}

fn street_schema() -> FieldSchema {
    FieldSchema {
        entity: EntityKind::Street,
        fields: vec![
            FieldSpec { name: "city", kind: FieldKind::Text, required: true, identity: true },
            FieldSpec { name: "name", kind: FieldKind::Text, required: true, identity: true },
        ],
    }
}

// ---------------------------------------------------------------------------
// Raw cell coercion
// ---------------------------------------------------------------------------

/// Tokens accepted as boolean `true`, lowercase. Includes the localized
/// yes/no pair used by the legacy spreadsheets.
const TRUE_TOKENS: &[&str] = &["yes", "true", "1", "y", "כן"];

/// Tokens accepted as boolean `false`, lowercase.
const FALSE_TOKENS: &[&str] = &["no", "false", "0", "n", "לא"];

/// Whether a raw cell counts as blank (empty or whitespace only).
pub fn is_blank(raw: &str) -> bool {
    raw.trim().is_empty()
}

/// Coerce one raw spreadsheet cell into a typed JSON value.
///
/// Returns a human-readable error naming what was expected. Blank cells must
/// be handled by the caller before coercion.
pub fn coerce_cell(kind: FieldKind, raw: &str) -> Result<Value, String> {
    let raw = raw.trim();
    match kind {
        FieldKind::Text => Ok(Value::String(raw.to_string())),
        FieldKind::Integer => coerce_integer(raw),
        FieldKind::Boolean => coerce_boolean(raw).map(Value::Bool),
        FieldKind::Date => coerce_date(raw),
        FieldKind::AttributeMap => coerce_attribute_map(raw),
        FieldKind::ImageSet => coerce_image_set(raw),
        FieldKind::FeatureMap => coerce_feature_map(raw),
    }
}

fn coerce_integer(raw: &str) -> Result<Value, String> {
    // Strip digit group separators: comma, space, narrow no-break space.
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, ',' | ' ' | '\u{202F}'))
        .collect();
    cleaned
        .parse::<i64>()
        .map(|n| Value::Number(n.into()))
        .map_err(|_| format!("expected a whole number, got '{raw}'"))
}

fn coerce_boolean(raw: &str) -> Result<bool, String> {
    let token = raw.to_lowercase();
    if TRUE_TOKENS.contains(&token.as_str()) {
        Ok(true)
    } else if FALSE_TOKENS.contains(&token.as_str()) {
        Ok(false)
    } else {
        Err(format!("expected a yes/no value, got '{raw}'"))
    }
}

fn coerce_date(raw: &str) -> Result<Value, String> {
    let parsed = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| chrono::NaiveDate::parse_from_str(raw, "%d/%m/%Y"));
    parsed
        .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
        .map_err(|_| format!("expected a date (YYYY-MM-DD or DD/MM/YYYY), got '{raw}'"))
}

fn coerce_attribute_map(raw: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|_| "expected a JSON object of attributes".to_string())?;
    let obj = value
        .as_object()
        .ok_or_else(|| "expected a JSON object of attributes".to_string())?;
    for (key, val) in obj {
        if !(val.is_string() || val.is_number() || val.is_boolean()) {
            return Err(format!("attribute '{key}' must be a string, number, or boolean"));
        }
    }
    Ok(value)
}

fn coerce_image_set(raw: &str) -> Result<Value, String> {
    if raw.starts_with('[') {
        let value: Value = serde_json::from_str(raw)
            .map_err(|_| "expected a JSON array of image URLs".to_string())?;
        let arr = value
            .as_array()
            .ok_or_else(|| "expected a JSON array of image URLs".to_string())?;
        if arr.iter().any(|v| !v.is_string()) {
            return Err("every image entry must be a URL string".to_string());
        }
        return Ok(value);
    }
    // Pipe-separated URL list, the spreadsheet-friendly form.
    let urls: Vec<Value> = raw
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Value::String(s.to_string()))
        .collect();
    Ok(Value::Array(urls))
}

fn coerce_feature_map(raw: &str) -> Result<Value, String> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|_| "expected a JSON object of feature toggles".to_string())?;
    let obj = value
        .as_object()
        .ok_or_else(|| "expected a JSON object of feature toggles".to_string())?;
    let mut out = serde_json::Map::new();
    for (key, val) in obj {
        let flag = match val {
            Value::Bool(b) => *b,
            Value::String(s) => coerce_boolean(s)
                .map_err(|_| format!("feature '{key}' must be a yes/no value"))?,
            Value::Number(n) if n.as_i64() == Some(0) => false,
            Value::Number(n) if n.as_i64() == Some(1) => true,
            _ => return Err(format!("feature '{key}' must be a yes/no value")),
        };
        out.insert(key.clone(), Value::Bool(flag));
    }
    Ok(Value::Object(out))
}

// ---------------------------------------------------------------------------
// Typed payload normalization (user-submitted edits)
// ---------------------------------------------------------------------------

/// Validate and normalize an already-typed proposed field map against the
/// schema.
///
/// Unknown fields are rejected outright rather than passed through untyped.
/// `null` clears an optional field; clearing a required field is an error.
/// String values are accepted where the raw-cell coercion would accept them
/// (e.g. `"1,750,000"` for an integer field).
pub fn normalize_proposed(
    schema: &FieldSchema,
    proposed: &serde_json::Map<String, Value>,
) -> Result<serde_json::Map<String, Value>, String> {
    let mut normalized = serde_json::Map::new();

    for (name, value) in proposed {
        let spec = schema
            .field(name)
            .ok_or_else(|| format!("unknown field '{name}' for {}", schema.entity))?;

        if value.is_null() {
            if spec.required {
                return Err(format!("required field '{name}' cannot be cleared"));
            }
            normalized.insert(name.clone(), Value::Null);
            continue;
        }

        let typed = normalize_typed_value(spec, value)
            .map_err(|e| format!("field '{name}': {e}"))?;
        normalized.insert(name.clone(), typed);
    }

    Ok(normalized)
}

fn normalize_typed_value(spec: &FieldSpec, value: &Value) -> Result<Value, String> {
    match spec.kind {
        FieldKind::Text => match value {
            Value::String(s) => Ok(Value::String(s.trim().to_string())),
            _ => Err("expected a string".to_string()),
        },
        FieldKind::Integer => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Ok(value.clone()),
            Value::String(s) => coerce_integer(s),
            _ => Err("expected a whole number".to_string()),
        },
        FieldKind::Boolean => match value {
            Value::Bool(_) => Ok(value.clone()),
            Value::String(s) => coerce_boolean(s).map(Value::Bool),
            _ => Err("expected a boolean".to_string()),
        },
        FieldKind::Date => match value {
            Value::String(s) => coerce_date(s),
            _ => Err("expected a date string".to_string()),
        },
        FieldKind::AttributeMap => {
            let text = serde_json::to_string(value).unwrap_or_default();
            coerce_attribute_map(&text)
        }
        FieldKind::ImageSet => match value {
            Value::Array(items) if items.iter().all(Value::is_string) => Ok(value.clone()),
            _ => Err("expected an array of image URL strings".to_string()),
        },
        FieldKind::FeatureMap => {
            let text = serde_json::to_string(value).unwrap_or_default();
            coerce_feature_map(&text)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
