//! Postgres-backed implementation of the persistence trait.

use sqlx::PgPool;

use reestr_core::{Category, LedgerEntry, Record, RecordRef, Store, StoreError};

use crate::{ledger, records, DbError};

pub use reestr_core::IMAGE_ATTRIBUTE_LABEL;

/// [`Store`] backed by a Postgres pool. Cheap to clone; the pool is an
/// `Arc` internally.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn to_store_error(err: DbError) -> StoreError {
    match err {
        DbError::NotFound => StoreError::NotFound("record".to_owned()),
        other => StoreError::Backend(other.to_string()),
    }
}

impl Store for PgStore {
    async fn record_exists(&self, record: &Record) -> Result<bool, StoreError> {
        records::record_exists(&self.pool, record)
            .await
            .map_err(to_store_error)
    }

    async fn insert_record(&self, record: &Record) -> Result<i64, StoreError> {
        records::insert_record(&self.pool, record)
            .await
            .map_err(to_store_error)
    }

    async fn find_record_by_doc_number(
        &self,
        doc_number: &str,
    ) -> Result<Option<RecordRef>, StoreError> {
        records::find_record_by_doc_number(&self.pool, doc_number)
            .await
            .map_err(to_store_error)
    }

    async fn attach_attribute(
        &self,
        record_id: i64,
        label: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        records::attach_attribute(&self.pool, record_id, label, value)
            .await
            .map_err(to_store_error)
    }

    async fn save_ledger_entry(
        &self,
        category: Category,
        document_number: &str,
        is_parsed: bool,
    ) -> Result<(), StoreError> {
        ledger::save_ledger_entry(&self.pool, category, document_number, is_parsed)
            .await
            .map_err(to_store_error)
    }

    async fn mark_ledger_parsed(
        &self,
        category: Category,
        document_number: &str,
    ) -> Result<(), StoreError> {
        ledger::mark_ledger_parsed(&self.pool, category, document_number)
            .await
            .map_err(to_store_error)
    }

    async fn list_unparsed_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        ledger::list_unparsed_entries(&self.pool)
            .await
            .map_err(to_store_error)
    }

    async fn list_entries_missing_image(
        &self,
        category: Category,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        ledger::list_entries_missing_image(&self.pool, category)
            .await
            .map_err(to_store_error)
    }
}
