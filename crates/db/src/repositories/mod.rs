//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async CRUD methods that
//! accept `&PgPool` (or `&mut PgConnection` for transaction-composable
//! operations) as the first argument.

pub mod audit_repo;
pub mod canonical_repo;
pub mod geo_repo;
pub mod import_log_repo;
pub mod listing_repo;
pub mod pending_edit_repo;
pub mod staged_batch_repo;
pub mod user_repo;

pub use audit_repo::AuditLogRepo;
pub use canonical_repo::CanonicalRepo;
pub use geo_repo::{CityRepo, StreetRepo};
pub use import_log_repo::ImportLogRepo;
pub use listing_repo::ListingRepo;
pub use pending_edit_repo::PendingEditRepo;
pub use staged_batch_repo::{NewStagedBatch, StagedBatchRepo};
pub use user_repo::UserRepo;
