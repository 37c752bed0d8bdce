//! Repository for the `listings` table.

use sqlx::PgPool;

use sokoni_core::types::DbId;

use crate::models::listing::{CreateListing, Listing};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, title, city, street, price, description, available_from, \
    attributes, images, features, created_at, updated_at";

/// Provides CRUD operations for canonical listings.
pub struct ListingRepo;

impl ListingRepo {
    /// Insert a new listing.
    pub async fn create(pool: &PgPool, input: &CreateListing) -> Result<Listing, sqlx::Error> {
        let query = format!(
            "INSERT INTO listings \
                (title, city, street, price, description, available_from, \
                 attributes, images, features) \
             VALUES ($1, $2, $3, $4, $5, $6, \
                 COALESCE($7, '{{}}'::jsonb), \
                 COALESCE($8, '[]'::jsonb), \
                 COALESCE($9, '{{}}'::jsonb)) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Listing>(&query)
            .bind(&input.title)
            .bind(&input.city)
            .bind(&input.street)
            .bind(input.price)
            .bind(&input.description)
            .bind(input.available_from)
            .bind(&input.attributes)
            .bind(&input.images)
            .bind(&input.features)
            .fetch_one(pool)
            .await
    }

    /// Find a listing by id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Listing>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM listings WHERE id = $1");
        sqlx::query_as::<_, Listing>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Count all listings.
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*)::BIGINT FROM listings")
            .fetch_one(pool)
            .await
    }
}
