//! Harvesting engine for the registry: browser-driven crawl of the paged
//! listing UI, HTTP fetch of detail pages, and the recovery services that
//! replay failures and backfill imagery.

pub mod backfill;
pub mod chrome;
pub mod crawl;
pub mod detail;
pub mod driver;
pub mod error;
pub mod image;
mod page;
mod retry;
pub mod session_pool;

#[cfg(test)]
pub(crate) mod testutil;

pub use backfill::{detail_url, replay_failed, ImageBackfill, ImageStats, ReplayStats};
pub use chrome::{ChromeSession, ChromeSessionFactory};
pub use crawl::{CrawlSettings, Crawler, Direction, SweepStats};
pub use detail::DetailFetcher;
pub use driver::{Element, Session, SessionFactory};
pub use error::{is_retryable_ui, HarvestError};
pub use image::download_image_base64;
pub use session_pool::SessionPool;
