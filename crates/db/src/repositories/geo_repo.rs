//! Repositories for the `cities` and `streets` tables.

use sqlx::PgPool;

use sokoni_core::types::DbId;

use crate::models::geo::{City, CreateCity, CreateStreet, Street};

const CITY_COLUMNS: &str = "id, name, created_at";
const STREET_COLUMNS: &str = "id, city, name, created_at";

/// Provides CRUD operations for cities.
pub struct CityRepo;

impl CityRepo {
    /// Insert a new city.
    pub async fn create(pool: &PgPool, input: &CreateCity) -> Result<City, sqlx::Error> {
        let query = format!("INSERT INTO cities (name) VALUES ($1) RETURNING {CITY_COLUMNS}");
        sqlx::query_as::<_, City>(&query)
            .bind(&input.name)
            .fetch_one(pool)
            .await
    }

    /// Find a city by id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<City>, sqlx::Error> {
        let query = format!("SELECT {CITY_COLUMNS} FROM cities WHERE id = $1");
        sqlx::query_as::<_, City>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List all cities ordered by name.
    pub async fn list(pool: &PgPool) -> Result<Vec<City>, sqlx::Error> {
        let query = format!("SELECT {CITY_COLUMNS} FROM cities ORDER BY name");
        sqlx::query_as::<_, City>(&query).fetch_all(pool).await
    }
}

/// Provides CRUD operations for streets.
pub struct StreetRepo;

impl StreetRepo {
    /// Insert a new street.
    pub async fn create(pool: &PgPool, input: &CreateStreet) -> Result<Street, sqlx::Error> {
        let query = format!(
            "INSERT INTO streets (city, name) VALUES ($1, $2) RETURNING {STREET_COLUMNS}"
        );
        sqlx::query_as::<_, Street>(&query)
            .bind(&input.city)
            .bind(&input.name)
            .fetch_one(pool)
            .await
    }

    /// List streets for a city ordered by name.
    pub async fn list_by_city(pool: &PgPool, city: &str) -> Result<Vec<Street>, sqlx::Error> {
        let query = format!(
            "SELECT {STREET_COLUMNS} FROM streets \
             WHERE LOWER(TRIM(city)) = LOWER(TRIM($1)) ORDER BY name"
        );
        sqlx::query_as::<_, Street>(&query)
            .bind(city)
            .fetch_all(pool)
            .await
    }
}
