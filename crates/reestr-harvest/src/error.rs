use reestr_core::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// The element handle no longer belongs to the live document. The page
    /// re-renders itself after every pager interaction, so these are
    /// expected and retried after a repair pass.
    #[error("stale element reference: {0}")]
    StaleReference(String),

    #[error("timed out after {waited_ms} ms waiting for {what}")]
    Timeout { what: String, waited_ms: u64 },

    /// A javascript dialog appeared where none was expected. Dismissed and
    /// retried.
    #[error("unexpected modal dialog")]
    UnexpectedModal,

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("unexpected http status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("browser driver error: {0}")]
    Driver(String),

    #[error("invalid selector: {0}")]
    Selector(String),

    #[error("session pool is closed")]
    PoolClosed,

    #[error("category setup failed for {category}: {reason}")]
    CategorySetup {
        category: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Returns `true` for UI-level failures that a short wait (plus a repair
/// pass for stale references) can fix.
///
/// Everything else is returned to the caller immediately: HTTP-level
/// failures have their own policy in the detail fetcher, and store or
/// driver errors will not improve on a second attempt.
#[must_use]
pub fn is_retryable_ui(err: &HarvestError) -> bool {
    matches!(
        err,
        HarvestError::StaleReference(_)
            | HarvestError::Timeout { .. }
            | HarvestError::UnexpectedModal
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_failures_are_retryable() {
        assert!(is_retryable_ui(&HarvestError::StaleReference(
            "card".to_owned()
        )));
        assert!(is_retryable_ui(&HarvestError::Timeout {
            what: "#cvReestr_DXMainTable".to_owned(),
            waited_ms: 20_000,
        }));
        assert!(is_retryable_ui(&HarvestError::UnexpectedModal));
    }

    #[test]
    fn http_and_store_failures_are_not() {
        assert!(!is_retryable_ui(&HarvestError::HttpStatus {
            status: 500,
            url: "https://gosreestr.kazpatent.kz/Invention/Details?docNumber=1".to_owned(),
        }));
        assert!(!is_retryable_ui(&HarvestError::Store(
            StoreError::Backend("pool exhausted".to_owned())
        )));
        assert!(!is_retryable_ui(&HarvestError::Driver(
            "browser gone".to_owned()
        )));
    }
}
