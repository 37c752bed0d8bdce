//! Canonical listing entity model.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;

use sokoni_core::types::{DbId, Timestamp};

/// A live, publicly-visible listing.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Listing {
    pub id: DbId,
    pub title: String,
    pub city: String,
    pub street: Option<String>,
    pub price: i64,
    pub description: Option<String>,
    pub available_from: Option<chrono::NaiveDate>,
    pub attributes: Value,
    pub images: Value,
    pub features: Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Listing {
    /// Snapshot the listing as a field map keyed by schema field names, for
    /// diffing against a proposed version. Absent optionals are omitted.
    pub fn snapshot(&self) -> serde_json::Map<String, Value> {
        let mut map = serde_json::Map::new();
        map.insert("title".to_string(), Value::String(self.title.clone()));
        map.insert("city".to_string(), Value::String(self.city.clone()));
        if let Some(street) = &self.street {
            map.insert("street".to_string(), Value::String(street.clone()));
        }
        map.insert("price".to_string(), Value::Number(self.price.into()));
        if let Some(description) = &self.description {
            map.insert("description".to_string(), Value::String(description.clone()));
        }
        if let Some(date) = self.available_from {
            map.insert(
                "available_from".to_string(),
                Value::String(date.format("%Y-%m-%d").to_string()),
            );
        }
        map.insert("attributes".to_string(), self.attributes.clone());
        map.insert("images".to_string(), self.images.clone());
        map.insert("features".to_string(), self.features.clone());
        map
    }
}

/// DTO for inserting a new listing directly (outside the import pipeline).
#[derive(Debug, Clone, Deserialize)]
pub struct CreateListing {
    pub title: String,
    pub city: String,
    pub street: Option<String>,
    pub price: i64,
    pub description: Option<String>,
    pub available_from: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub attributes: Option<Value>,
    #[serde(default)]
    pub images: Option<Value>,
    #[serde(default)]
    pub features: Option<Value>,
}
