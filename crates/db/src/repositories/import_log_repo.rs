//! Repository for the `import_logs` table.

use sqlx::{PgConnection, PgPool};

use crate::models::import_log::{CreateImportLog, ImportLog};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "\
    id, file_name, entity_kind, total_rows, success_rows, failed_rows, \
    committed_by, created_at";

/// Provides insert and listing operations for import logs.
pub struct ImportLogRepo;

impl ImportLogRepo {
    /// Insert a new import log row. Runs on `&mut PgConnection` so the
    /// committer can write it inside the commit transaction.
    pub async fn create(
        conn: &mut PgConnection,
        input: &CreateImportLog,
    ) -> Result<ImportLog, sqlx::Error> {
        let query = format!(
            "INSERT INTO import_logs \
                (file_name, entity_kind, total_rows, success_rows, failed_rows, committed_by) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ImportLog>(&query)
            .bind(&input.file_name)
            .bind(&input.entity_kind)
            .bind(input.total_rows)
            .bind(input.success_rows)
            .bind(input.failed_rows)
            .bind(input.committed_by)
            .fetch_one(conn)
            .await
    }

    /// List import logs, newest first.
    pub async fn list(pool: &PgPool, limit: Option<i64>) -> Result<Vec<ImportLog>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM import_logs ORDER BY created_at DESC LIMIT $1"
        );
        sqlx::query_as::<_, ImportLog>(&query)
            .bind(limit.unwrap_or(100))
            .fetch_all(pool)
            .await
    }
}
