//! City and street reference entities.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use sokoni_core::types::{DbId, Timestamp};

/// A city known to the marketplace.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct City {
    pub id: DbId,
    pub name: String,
    pub created_at: Timestamp,
}

/// DTO for inserting a new city.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateCity {
    pub name: String,
}

/// A street within a city.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Street {
    pub id: DbId,
    pub city: String,
    pub name: String,
    pub created_at: Timestamp,
}

/// DTO for inserting a new street.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateStreet {
    pub city: String,
    pub name: String,
}
