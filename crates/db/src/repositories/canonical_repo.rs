//! Entity-kind-generic operations on the canonical store.
//!
//! The import committer and the edit applier both work on "whatever entity
//! kind the batch or edit targets"; this repository centralizes the
//! dispatch so those flows stay schema-driven instead of growing one branch
//! per table at every call site.
//!
//! Methods run on `&mut PgConnection` so callers can compose them inside a
//! single transaction. Semantic failures (a malformed row, a dangling city
//! reference) are returned as the inner `Err(String)` so the caller decides
//! whether to skip the row or roll the whole transaction back; the outer
//! error remains a database failure.

use std::collections::HashSet;

use serde_json::Value;
use sqlx::PgConnection;

use sokoni_core::delta::FieldDelta;
use sokoni_core::rows::dedupe_key;
use sokoni_core::schema::{schema_for, EntityKind};
use sokoni_core::types::DbId;

use crate::models::listing::Listing;

const LISTING_COLUMNS: &str = "id, title, city, street, price, description, available_from, \
    attributes, images, features, created_at, updated_at";

/// Provides kind-dispatched reads and writes on canonical entities.
pub struct CanonicalRepo;

impl CanonicalRepo {
    /// Collect the dedupe keys of every canonical entity of a kind.
    ///
    /// Keys are computed with the same [`dedupe_key`] function the row
    /// validator uses, so batch rows and canonical rows can never disagree
    /// on key format.
    pub async fn dedupe_keys(
        conn: &mut PgConnection,
        kind: EntityKind,
    ) -> Result<HashSet<String>, sqlx::Error> {
        let schema = schema_for(kind);
        let mut keys = HashSet::new();

        match kind {
            EntityKind::Listing => {
                let rows: Vec<(String, String)> =
                    sqlx::query_as("SELECT title, city FROM listings")
                        .fetch_all(conn)
                        .await?;
                for (title, city) in rows {
                    let mut map = serde_json::Map::new();
                    map.insert("title".to_string(), Value::String(title));
                    map.insert("city".to_string(), Value::String(city));
                    if let Some(key) = dedupe_key(&schema, &map) {
                        keys.insert(key);
                    }
                }
            }
            EntityKind::City => {
                let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM cities")
                    .fetch_all(conn)
                    .await?;
                for (name,) in rows {
                    let mut map = serde_json::Map::new();
                    map.insert("name".to_string(), Value::String(name));
                    if let Some(key) = dedupe_key(&schema, &map) {
                        keys.insert(key);
                    }
                }
            }
            EntityKind::Street => {
                let rows: Vec<(String, String)> =
                    sqlx::query_as("SELECT city, name FROM streets")
                        .fetch_all(conn)
                        .await?;
                for (city, name) in rows {
                    let mut map = serde_json::Map::new();
                    map.insert("city".to_string(), Value::String(city));
                    map.insert("name".to_string(), Value::String(name));
                    if let Some(key) = dedupe_key(&schema, &map) {
                        keys.insert(key);
                    }
                }
            }
        }

        Ok(keys)
    }

    /// Snapshot one canonical entity as a field map keyed by schema field
    /// names, for diffing. Returns `None` when the entity does not exist.
    pub async fn snapshot(
        conn: &mut PgConnection,
        kind: EntityKind,
        id: DbId,
    ) -> Result<Option<serde_json::Map<String, Value>>, sqlx::Error> {
        match kind {
            EntityKind::Listing => {
                let query = format!("SELECT {LISTING_COLUMNS} FROM listings WHERE id = $1");
                let listing = sqlx::query_as::<_, Listing>(&query)
                    .bind(id)
                    .fetch_optional(conn)
                    .await?;
                Ok(listing.map(|l| l.snapshot()))
            }
            EntityKind::City => {
                let name: Option<String> =
                    sqlx::query_scalar("SELECT name FROM cities WHERE id = $1")
                        .bind(id)
                        .fetch_optional(conn)
                        .await?;
                Ok(name.map(|n| {
                    let mut map = serde_json::Map::new();
                    map.insert("name".to_string(), Value::String(n));
                    map
                }))
            }
            EntityKind::Street => {
                let row: Option<(String, String)> =
                    sqlx::query_as("SELECT city, name FROM streets WHERE id = $1")
                        .bind(id)
                        .fetch_optional(conn)
                        .await?;
                Ok(row.map(|(city, name)| {
                    let mut map = serde_json::Map::new();
                    map.insert("city".to_string(), Value::String(city));
                    map.insert("name".to_string(), Value::String(name));
                    map
                }))
            }
        }
    }

    /// Delete every canonical entity of a kind. Destructive; callers gate
    /// this behind an explicit confirmation.
    pub async fn wipe(conn: &mut PgConnection, kind: EntityKind) -> Result<u64, sqlx::Error> {
        let query = match kind {
            EntityKind::Listing => "DELETE FROM listings",
            EntityKind::City => "DELETE FROM cities",
            EntityKind::Street => "DELETE FROM streets",
        };
        let result = sqlx::query(query).execute(conn).await?;
        Ok(result.rows_affected())
    }

    /// Insert one canonical entity from a validated normalized row.
    ///
    /// The inner `Err` carries a per-row reason (e.g. a field the schema
    /// requires is missing from the normalized map) and leaves the caller
    /// free to keep the transaction going.
    pub async fn insert_row(
        conn: &mut PgConnection,
        kind: EntityKind,
        normalized: &serde_json::Map<String, Value>,
    ) -> Result<Result<DbId, String>, sqlx::Error> {
        match kind {
            EntityKind::Listing => Self::insert_listing_row(conn, normalized).await,
            EntityKind::City => {
                let Some(name) = normalized.get("name").and_then(Value::as_str) else {
                    return Ok(Err("row is missing 'name'".to_string()));
                };
                let id = sqlx::query_scalar::<_, DbId>(
                    "INSERT INTO cities (name) VALUES ($1) RETURNING id",
                )
                .bind(name)
                .fetch_one(conn)
                .await?;
                Ok(Ok(id))
            }
            EntityKind::Street => {
                let Some(city) = normalized.get("city").and_then(Value::as_str) else {
                    return Ok(Err("row is missing 'city'".to_string()));
                };
                let Some(name) = normalized.get("name").and_then(Value::as_str) else {
                    return Ok(Err("row is missing 'name'".to_string()));
                };
                let id = sqlx::query_scalar::<_, DbId>(
                    "INSERT INTO streets (city, name) VALUES ($1, $2) RETURNING id",
                )
                .bind(city)
                .bind(name)
                .fetch_one(conn)
                .await?;
                Ok(Ok(id))
            }
        }
    }

    async fn insert_listing_row(
        conn: &mut PgConnection,
        normalized: &serde_json::Map<String, Value>,
    ) -> Result<Result<DbId, String>, sqlx::Error> {
        let Some(title) = normalized.get("title").and_then(Value::as_str) else {
            return Ok(Err("row is missing 'title'".to_string()));
        };
        let Some(city) = normalized.get("city").and_then(Value::as_str) else {
            return Ok(Err("row is missing 'city'".to_string()));
        };
        let Some(price) = normalized.get("price").and_then(Value::as_i64) else {
            return Ok(Err("row is missing 'price'".to_string()));
        };
        let street = normalized.get("street").and_then(Value::as_str);
        let description = normalized.get("description").and_then(Value::as_str);
        let available_from = match normalized.get("available_from").and_then(Value::as_str) {
            Some(s) => match chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                Ok(d) => Some(d),
                Err(_) => return Ok(Err(format!("invalid date '{s}'"))),
            },
            None => None,
        };
        let attributes = normalized
            .get("attributes")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));
        let images = normalized
            .get("images")
            .cloned()
            .unwrap_or_else(|| serde_json::json!([]));
        let features = normalized
            .get("features")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        let id = sqlx::query_scalar::<_, DbId>(
            "INSERT INTO listings \
                (title, city, street, price, description, available_from, \
                 attributes, images, features) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING id",
        )
        .bind(title)
        .bind(city)
        .bind(street)
        .bind(price)
        .bind(description)
        .bind(available_from)
        .bind(attributes)
        .bind(images)
        .bind(features)
        .fetch_one(conn)
        .await?;
        Ok(Ok(id))
    }

    /// Apply a pending edit's cached deltas to one canonical entity.
    ///
    /// All writes run on the caller's transaction connection; the first
    /// semantic failure returns the inner `Err` so the caller rolls the
    /// transaction back, leaving the entity untouched.
    pub async fn apply_deltas(
        conn: &mut PgConnection,
        kind: EntityKind,
        id: DbId,
        deltas: &[FieldDelta],
    ) -> Result<Result<(), String>, sqlx::Error> {
        // Row-level lock; also detects an entity deleted since submission.
        let locked: Option<DbId> = match kind {
            EntityKind::Listing => {
                sqlx::query_scalar("SELECT id FROM listings WHERE id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?
            }
            EntityKind::City => {
                sqlx::query_scalar("SELECT id FROM cities WHERE id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?
            }
            EntityKind::Street => {
                sqlx::query_scalar("SELECT id FROM streets WHERE id = $1 FOR UPDATE")
                    .bind(id)
                    .fetch_optional(&mut *conn)
                    .await?
            }
        };
        if locked.is_none() {
            return Ok(Err(format!("{kind} {id} no longer exists")));
        }

        for delta in deltas {
            let applied = match kind {
                EntityKind::Listing => Self::apply_listing_delta(&mut *conn, id, delta).await?,
                EntityKind::City => Self::apply_city_delta(&mut *conn, id, delta).await?,
                EntityKind::Street => Self::apply_street_delta(&mut *conn, id, delta).await?,
            };
            if let Err(reason) = applied {
                return Ok(Err(reason));
            }
        }

        Ok(Ok(()))
    }

    async fn apply_listing_delta(
        conn: &mut PgConnection,
        id: DbId,
        delta: &FieldDelta,
    ) -> Result<Result<(), String>, sqlx::Error> {
        let path = delta.field_path.as_str();

        match path {
            "title" | "city" | "street" | "description" => {
                let new = delta.new_value.as_ref().and_then(Value::as_str);
                if new.is_none() && matches!(path, "title" | "city") {
                    return Ok(Err(format!("required field '{path}' cannot be cleared")));
                }
                if path == "city" {
                    let Some(city) = new else {
                        return Ok(Err("required field 'city' cannot be cleared".to_string()));
                    };
                    let exists: bool = sqlx::query_scalar(
                        "SELECT EXISTS(SELECT 1 FROM cities \
                         WHERE LOWER(TRIM(name)) = LOWER(TRIM($1)))",
                    )
                    .bind(city)
                    .fetch_one(&mut *conn)
                    .await?;
                    if !exists {
                        return Ok(Err(format!("city '{city}' does not exist")));
                    }
                }
                let query = format!(
                    "UPDATE listings SET {path} = $2, updated_at = now() WHERE id = $1"
                );
                sqlx::query(&query).bind(id).bind(new).execute(conn).await?;
                Ok(Ok(()))
            }
            "price" => {
                let Some(price) = delta.new_value.as_ref().and_then(Value::as_i64) else {
                    return Ok(Err("price must be a whole number".to_string()));
                };
                sqlx::query("UPDATE listings SET price = $2, updated_at = now() WHERE id = $1")
                    .bind(id)
                    .bind(price)
                    .execute(conn)
                    .await?;
                Ok(Ok(()))
            }
            "available_from" => {
                let date = match delta.new_value.as_ref().and_then(Value::as_str) {
                    Some(s) => match chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                        Ok(d) => Some(d),
                        Err(_) => return Ok(Err(format!("invalid date '{s}'"))),
                    },
                    None => None,
                };
                sqlx::query(
                    "UPDATE listings SET available_from = $2, updated_at = now() WHERE id = $1",
                )
                .bind(id)
                .bind(date)
                .execute(conn)
                .await?;
                Ok(Ok(()))
            }
            "images" => {
                let images = delta
                    .new_value
                    .clone()
                    .unwrap_or_else(|| serde_json::json!([]));
                sqlx::query("UPDATE listings SET images = $2, updated_at = now() WHERE id = $1")
                    .bind(id)
                    .bind(images)
                    .execute(conn)
                    .await?;
                Ok(Ok(()))
            }
            p if p.starts_with("attributes.") => {
                let segments: Vec<String> =
                    p.split('.').skip(1).map(str::to_string).collect();
                match &delta.new_value {
                    Some(value) => {
                        sqlx::query(
                            "UPDATE listings \
                             SET attributes = jsonb_set(attributes, $2::text[], $3::jsonb, true), \
                                 updated_at = now() \
                             WHERE id = $1",
                        )
                        .bind(id)
                        .bind(&segments)
                        .bind(value)
                        .execute(conn)
                        .await?;
                    }
                    None => {
                        sqlx::query(
                            "UPDATE listings \
                             SET attributes = attributes #- $2::text[], updated_at = now() \
                             WHERE id = $1",
                        )
                        .bind(id)
                        .bind(&segments)
                        .execute(conn)
                        .await?;
                    }
                }
                Ok(Ok(()))
            }
            p if p.starts_with("features.") => {
                let key = &p["features.".len()..];
                match &delta.new_value {
                    Some(value) if value.is_boolean() => {
                        sqlx::query(
                            "UPDATE listings \
                             SET features = jsonb_set(features, ARRAY[$2], $3::jsonb, true), \
                                 updated_at = now() \
                             WHERE id = $1",
                        )
                        .bind(id)
                        .bind(key)
                        .bind(value)
                        .execute(conn)
                        .await?;
                        Ok(Ok(()))
                    }
                    Some(_) => Ok(Err(format!("feature '{key}' must be a boolean"))),
                    None => {
                        sqlx::query(
                            "UPDATE listings \
                             SET features = features - $2, updated_at = now() \
                             WHERE id = $1",
                        )
                        .bind(id)
                        .bind(key)
                        .execute(conn)
                        .await?;
                        Ok(Ok(()))
                    }
                }
            }
            other => Ok(Err(format!("unsupported field path '{other}'"))),
        }
    }

    async fn apply_city_delta(
        conn: &mut PgConnection,
        id: DbId,
        delta: &FieldDelta,
    ) -> Result<Result<(), String>, sqlx::Error> {
        match delta.field_path.as_str() {
            "name" => {
                let Some(name) = delta.new_value.as_ref().and_then(Value::as_str) else {
                    return Ok(Err("required field 'name' cannot be cleared".to_string()));
                };
                sqlx::query("UPDATE cities SET name = $2 WHERE id = $1")
                    .bind(id)
                    .bind(name)
                    .execute(conn)
                    .await?;
                Ok(Ok(()))
            }
            other => Ok(Err(format!("unsupported field path '{other}'"))),
        }
    }

    async fn apply_street_delta(
        conn: &mut PgConnection,
        id: DbId,
        delta: &FieldDelta,
    ) -> Result<Result<(), String>, sqlx::Error> {
        match delta.field_path.as_str() {
            path @ ("city" | "name") => {
                let Some(value) = delta.new_value.as_ref().and_then(Value::as_str) else {
                    return Ok(Err(format!("required field '{path}' cannot be cleared")));
                };
                let query = format!("UPDATE streets SET {path} = $2 WHERE id = $1");
                sqlx::query(&query)
                    .bind(id)
                    .bind(value)
                    .execute(conn)
                    .await?;
                Ok(Ok(()))
            }
            other => Ok(Err(format!("unsupported field path '{other}'"))),
        }
    }
}
