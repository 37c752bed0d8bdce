//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts

pub mod audit;
pub mod geo;
pub mod import_log;
pub mod listing;
pub mod pending_edit;
pub mod staged;
pub mod user;
