//! Database operations for `records` and `record_extension_attributes`.

use sqlx::PgPool;

use reestr_core::{Record, RecordRef};

use crate::DbError;

/// Inserts a record together with its extension attributes in one
/// transaction and returns the new surrogate id.
///
/// The natural-key unique indexes make a concurrent duplicate insert fail
/// rather than silently double-persist; callers run the dedup gate first,
/// so a conflict here only happens on the benign same-identifier race.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails (including a natural-key
/// conflict from a concurrent insert of the same identifier).
pub async fn insert_record(pool: &PgPool, record: &Record) -> Result<i64, DbError> {
    let mut tx = pool.begin().await?;

    let id: i64 = sqlx::query_scalar::<_, i64>(
        "INSERT INTO records \
             (category, site, title, application_number, filing_date, \
              registration_date, expiration_date, bulletin_date, authors, \
              holder, owner, security_doc_number, registration_number, \
              status, ipc, classification_code, bulletin_number, sort_name, \
              doc_number, image_url) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, \
                 $11, $12, $13, $14, $15, $16, $17, $18, $19, $20) \
         RETURNING id",
    )
    .bind(record.category.as_str())
    .bind(&record.site)
    .bind(&record.title)
    .bind(&record.application_number)
    .bind(record.filing_date)
    .bind(record.registration_date)
    .bind(record.expiration_date)
    .bind(record.bulletin_date)
    .bind(&record.authors)
    .bind(&record.holder)
    .bind(&record.owner)
    .bind(&record.security_doc_number)
    .bind(&record.registration_number)
    .bind(&record.status)
    .bind(&record.ipc)
    .bind(&record.classification_code)
    .bind(&record.bulletin_number)
    .bind(&record.sort_name)
    .bind(&record.doc_number)
    .bind(&record.image_url)
    .fetch_one(&mut *tx)
    .await?;

    for attribute in &record.extension_attributes {
        sqlx::query(
            "INSERT INTO record_extension_attributes (record_id, label, value) \
             VALUES ($1, $2, $3)",
        )
        .bind(id)
        .bind(&attribute.label)
        .bind(&attribute.value)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(id)
}

/// Dedup-gate existence check.
///
/// A record with neither identifier is never a duplicate. Otherwise the
/// one populated identifier is checked together with category and site;
/// when both are present the security document number wins.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn record_exists(pool: &PgPool, record: &Record) -> Result<bool, DbError> {
    let (column, value) = if let Some(number) = record.security_doc_number.as_deref() {
        ("security_doc_number", number)
    } else if let Some(number) = record.registration_number.as_deref() {
        ("registration_number", number)
    } else {
        return Ok(false);
    };

    let query = format!(
        "SELECT EXISTS (SELECT 1 FROM records \
         WHERE category = $1 AND site = $2 AND {column} = $3)"
    );
    let exists: bool = sqlx::query_scalar(&query)
        .bind(record.category.as_str())
        .bind(&record.site)
        .bind(value)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

/// Finds a persisted record by the document identifier its detail URL
/// carried, returning the surrogate id and stored image URL.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the query fails.
pub async fn find_record_by_doc_number(
    pool: &PgPool,
    doc_number: &str,
) -> Result<Option<RecordRef>, DbError> {
    let row: Option<(i64, Option<String>)> =
        sqlx::query_as("SELECT id, image_url FROM records WHERE doc_number = $1 LIMIT 1")
            .bind(doc_number)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(id, image_url)| RecordRef { id, image_url }))
}

/// Attaches one extension attribute to an existing record.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the insert fails.
pub async fn attach_attribute(
    pool: &PgPool,
    record_id: i64,
    label: &str,
    value: &str,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO record_extension_attributes (record_id, label, value) \
         VALUES ($1, $2, $3)",
    )
    .bind(record_id)
    .bind(label)
    .bind(value)
    .execute(pool)
    .await?;
    Ok(())
}
