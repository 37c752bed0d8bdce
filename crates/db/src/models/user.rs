//! User entity model. The `role` column is the authorization store consulted
//! by the moderation gateway.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use sokoni_core::types::{DbId, Timestamp};

/// A registered user.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub display_name: String,
    pub role: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a new user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateUser {
    pub email: String,
    pub display_name: String,
    pub role: String,
}
