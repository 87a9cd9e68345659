//! Canonical harvested record, its extension attributes, and the ledger
//! entry that makes crawling resumable.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::category::Category;

/// Host of the registry all records currently come from. Part of every
/// record's natural key so a second registry site can coexist later.
pub const REGISTRY_SITE: &str = "gosreestr.kazpatent.kz";

/// Extension-attribute label under which captured imagery is stored.
pub const IMAGE_ATTRIBUTE_LABEL: &str = "imageBase64";

/// A label/value pair for a registry field with no first-class column.
///
/// Owned exclusively by one record; the schema cascade-deletes attributes
/// with their record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionAttribute {
    pub label: String,
    pub value: String,
}

/// A harvested registry entry.
///
/// Identity is (`category`, `site`, `security_doc_number` XOR
/// `registration_number`): exactly one of the two document-number fields
/// is authoritative per record. Both present is tolerated; the security
/// document number takes precedence. A record is immutable once persisted
/// except for attaching further extension attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub category: Category,
    pub site: String,
    pub title: Option<String>,
    pub application_number: Option<String>,
    pub filing_date: Option<NaiveDate>,
    pub registration_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    pub bulletin_date: Option<NaiveDate>,
    pub authors: Option<String>,
    pub holder: Option<String>,
    pub owner: Option<String>,
    pub security_doc_number: Option<String>,
    pub registration_number: Option<String>,
    pub status: Option<String>,
    pub ipc: Option<String>,
    /// MKPO or MKTU classification, whichever the detail page carries.
    pub classification_code: Option<String>,
    pub bulletin_number: Option<String>,
    pub sort_name: Option<String>,
    /// Document identifier extracted from the detail URL query string.
    pub doc_number: Option<String>,
    pub image_url: Option<String>,
    pub extension_attributes: Vec<ExtensionAttribute>,
}

macro_rules! take_if_present {
    ($dst:expr, $src:expr, $($field:ident),+ $(,)?) => {
        $(
            if $src.$field.is_some() {
                $dst.$field = $src.$field;
            }
        )+
    };
}

impl Record {
    /// Skeleton record for one registry category on the default site.
    #[must_use]
    pub fn for_category(category: Category) -> Record {
        Record {
            category,
            site: REGISTRY_SITE.to_owned(),
            title: None,
            application_number: None,
            filing_date: None,
            registration_date: None,
            expiration_date: None,
            bulletin_date: None,
            authors: None,
            holder: None,
            owner: None,
            security_doc_number: None,
            registration_number: None,
            status: None,
            ipc: None,
            classification_code: None,
            bulletin_number: None,
            sort_name: None,
            doc_number: None,
            image_url: None,
            extension_attributes: Vec::new(),
        }
    }

    /// Merges a detail-page record into this summary record.
    ///
    /// Detail values overwrite summary values only when present; the
    /// summary is the fallback. Extension attributes are replaced
    /// wholesale since only the detail page produces them.
    pub fn merge_detail(&mut self, detail: Record) {
        take_if_present!(
            self,
            detail,
            title,
            status,
            security_doc_number,
            registration_number,
            application_number,
            authors,
            filing_date,
            registration_date,
            expiration_date,
            bulletin_number,
            bulletin_date,
            ipc,
            classification_code,
            sort_name,
            holder,
            owner,
            doc_number,
            image_url,
        );
        if !detail.extension_attributes.is_empty() {
            self.extension_attributes = detail.extension_attributes;
        }
    }

    /// A record is persistable iff its status field is non-empty,
    /// regardless of any other field's absence.
    #[must_use]
    pub fn is_persistable(&self) -> bool {
        self.status.as_deref().is_some_and(|s| !s.is_empty())
    }

    /// The authoritative document identifier, security document number
    /// first. `None` means the record can never be considered a duplicate.
    #[must_use]
    pub fn identity_number(&self) -> Option<&str> {
        self.security_doc_number
            .as_deref()
            .or(self.registration_number.as_deref())
    }

    /// Identifier used in log lines, matching [`Self::identity_number`]
    /// with a placeholder for records that have neither number.
    #[must_use]
    pub fn log_key(&self) -> &str {
        self.identity_number().unwrap_or("<no identifier>")
    }
}

/// A registry document identifier that was visited but not successfully
/// committed as a valid new record, or one deferred for image backfill.
///
/// At most one entry exists per (`category`, `document_number`).
/// `is_parsed` only ever transitions false to true; a parsed entry is
/// permanent history and is never reset to retryable automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub category: Category,
    pub document_number: String,
    pub is_parsed: bool,
}

/// Extracts the document identifier from a detail URL: the substring
/// after the last `=` (the `docNumber` query parameter value).
#[must_use]
pub fn doc_number_from_url(url: &str) -> &str {
    url.rfind('=').map_or(url, |i| &url[i + 1..])
}
