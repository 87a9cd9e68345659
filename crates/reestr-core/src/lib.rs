pub mod app_config;
pub mod card;
pub mod category;
pub mod config;
pub mod fields;
pub mod record;
pub mod store;
pub mod translit;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use card::extract_summary;
pub use category::Category;
pub use config::{load_app_config, load_app_config_from_env};
pub use record::{
    doc_number_from_url, ExtensionAttribute, LedgerEntry, Record, IMAGE_ATTRIBUTE_LABEL,
    REGISTRY_SITE,
};
pub use store::{RecordRef, Store, StoreError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown category: {0}")]
    UnknownCategory(String),
}
