//! Database operations for the failed/pending-item ledger.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use reestr_core::{Category, LedgerEntry};

use crate::DbError;

/// A row from the `ledger_entries` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LedgerRow {
    pub id: i64,
    pub category: String,
    pub document_number: String,
    pub is_parsed: bool,
    pub created_at: DateTime<Utc>,
}

impl LedgerRow {
    /// Converts the row into the domain entry.
    ///
    /// # Errors
    ///
    /// Returns [`DbError::UnknownCategory`] if the stored category token
    /// is not part of the closed enumeration.
    pub fn into_entry(self) -> Result<LedgerEntry, DbError> {
        let category =
            Category::parse(&self.category).map_err(|_| DbError::UnknownCategory(self.category))?;
        Ok(LedgerEntry {
            category,
            document_number: self.document_number,
            is_parsed: self.is_parsed,
        })
    }
}

/// Idempotent ledger write keyed on (category, document_number).
///
/// A duplicate write is a no-op except that `is_parsed` may be raised
/// from false to true; it is never lowered (`OR` on conflict).
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn save_ledger_entry(
    pool: &PgPool,
    category: Category,
    document_number: &str,
    is_parsed: bool,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO ledger_entries (category, document_number, is_parsed) \
         VALUES ($1, $2, $3) \
         ON CONFLICT (category, document_number) DO UPDATE \
             SET is_parsed = ledger_entries.is_parsed OR EXCLUDED.is_parsed",
    )
    .bind(category.as_str())
    .bind(document_number)
    .bind(is_parsed)
    .execute(pool)
    .await?;
    Ok(())
}

/// Marks one entry as successfully replayed. Missing entries are created
/// parsed, so a replay that raced the original write still leaves the
/// permanent marker behind.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the upsert fails.
pub async fn mark_ledger_parsed(
    pool: &PgPool,
    category: Category,
    document_number: &str,
) -> Result<(), DbError> {
    save_ledger_entry(pool, category, document_number, true).await
}

/// All entries still awaiting a successful replay, oldest first.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::UnknownCategory`] for rows written by a newer schema.
pub async fn list_unparsed_entries(pool: &PgPool) -> Result<Vec<LedgerEntry>, DbError> {
    let rows = sqlx::query_as::<_, LedgerRow>(
        "SELECT id, category, document_number, is_parsed, created_at \
         FROM ledger_entries WHERE is_parsed = FALSE ORDER BY id",
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(LedgerRow::into_entry).collect()
}

/// Ledger entries in `category` whose persisted record lacks the
/// captured-image extension attribute.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails, or
/// [`DbError::UnknownCategory`] for rows written by a newer schema.
pub async fn list_entries_missing_image(
    pool: &PgPool,
    category: Category,
) -> Result<Vec<LedgerEntry>, DbError> {
    let rows = sqlx::query_as::<_, LedgerRow>(
        "SELECT l.id, l.category, l.document_number, l.is_parsed, l.created_at \
         FROM ledger_entries l \
         JOIN records r \
           ON r.doc_number = l.document_number AND r.category = l.category \
         WHERE l.category = $1 \
           AND NOT EXISTS (SELECT 1 FROM record_extension_attributes a \
                           WHERE a.record_id = r.id AND a.label = $2) \
         ORDER BY l.id",
    )
    .bind(category.as_str())
    .bind(crate::store::IMAGE_ATTRIBUTE_LABEL)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(LedgerRow::into_entry).collect()
}
