//! Pure domain logic for the sokoni moderation and bulk-import pipeline.
//!
//! This crate has no database, async, or I/O dependencies. It provides:
//!
//! - Entity field schemas and value coercion ([`schema`])
//! - Row classification for bulk imports ([`rows`])
//! - The field-level diff engine ([`delta`])
//! - The pending-edit state machine ([`moderation`])
//! - Audit action constants and the integrity hash chain ([`audit`])

pub mod audit;
pub mod delta;
pub mod error;
pub mod hashing;
pub mod moderation;
pub mod roles;
pub mod rows;
pub mod schema;
pub mod types;
