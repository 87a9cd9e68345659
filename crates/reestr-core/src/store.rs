//! Persistence capability consumed by the harvest pipeline.
//!
//! The crawl and backfill code never talk to a database directly; they go
//! through this trait. The production implementation lives in `reestr-db`
//! (Postgres via sqlx); tests use an in-memory implementation.

use std::future::Future;

use thiserror::Error;

use crate::category::Category;
use crate::record::{LedgerEntry, Record};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Minimal view of a persisted record needed by the image backfill.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRef {
    pub id: i64,
    pub image_url: Option<String>,
}

pub trait Store: Send + Sync {
    /// Dedup gate. A record with neither a security document number nor a
    /// registration number is never a duplicate (deliberately permissive
    /// for incomplete data); otherwise the one populated identifier is
    /// checked together with category and site.
    fn record_exists(
        &self,
        record: &Record,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Persists a record and its extension attributes, returning the
    /// surrogate id. Core identity fields are never rewritten afterwards.
    fn insert_record(
        &self,
        record: &Record,
    ) -> impl Future<Output = Result<i64, StoreError>> + Send;

    /// Looks a record up by the document identifier its detail URL
    /// carried, for later attribute attachment.
    fn find_record_by_doc_number(
        &self,
        doc_number: &str,
    ) -> impl Future<Output = Result<Option<RecordRef>, StoreError>> + Send;

    /// Attaches one extension attribute to an already-persisted record.
    fn attach_attribute(
        &self,
        record_id: i64,
        label: &str,
        value: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Idempotent ledger write keyed on (category, document number).
    /// Never downgrades `is_parsed` from true back to false.
    fn save_ledger_entry(
        &self,
        category: Category,
        document_number: &str,
        is_parsed: bool,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Marks a ledger entry as successfully replayed.
    fn mark_ledger_parsed(
        &self,
        category: Category,
        document_number: &str,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// All entries still awaiting a successful replay.
    fn list_unparsed_entries(
        &self,
    ) -> impl Future<Output = Result<Vec<LedgerEntry>, StoreError>> + Send;

    /// Ledger entries in `category` whose persisted record lacks the
    /// captured-image extension attribute.
    fn list_entries_missing_image(
        &self,
        category: Category,
    ) -> impl Future<Output = Result<Vec<LedgerEntry>, StoreError>> + Send;
}
