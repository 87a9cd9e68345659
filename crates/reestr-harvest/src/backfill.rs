//! Recovery services over the failure ledger: sequential replay of failed
//! detail fetches, and a pooled image backfill for records persisted
//! without their trademark imagery.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use tracing::{debug, info, warn};

use reestr_core::{AppConfig, Category, LedgerEntry, Store, IMAGE_ATTRIBUTE_LABEL};

use crate::detail::DetailFetcher;
use crate::driver::{Element, Session, SessionFactory};
use crate::error::HarvestError;
use crate::image::download_image_base64;
use crate::session_pool::SessionPool;

const DETAIL_INFO: &str = "div.detial_plan_info";
/// Representative image candidates, most specific first. The whole info
/// block is the textual fallback when neither matches.
const IMAGE_SELECTORS: [&str; 2] = ["div.plan_img5 img", "div.plan_img img"];

/// Rebuilds a detail-page URL from a bare document number.
#[must_use]
pub fn detail_url(base_url: &str, category: Category, doc_number: &str) -> String {
    format!(
        "{}/{}/Details?docNumber={}",
        base_url.trim_end_matches('/'),
        category.path_segment(),
        doc_number
    )
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub attempted: u32,
    pub recovered: u32,
    pub already_persisted: u32,
    pub still_failing: u32,
}

/// Re-fetches every unparsed ledger entry, sequentially.
///
/// Entries whose record turns out to already exist are just marked
/// parsed. Entries that fetch and validate are persisted and marked
/// parsed. Everything else stays unparsed for the next replay.
///
/// # Errors
///
/// Returns the first store failure; fetch failures only affect their
/// entry.
pub async fn replay_failed<S: Store>(
    detail: &DetailFetcher<S>,
    store: &S,
    base_url: &str,
) -> Result<ReplayStats, HarvestError> {
    let entries = store.list_unparsed_entries().await?;
    info!(count = entries.len(), "replaying failed ledger entries");

    let mut stats = ReplayStats::default();
    for entry in entries {
        stats.attempted += 1;
        let url = detail_url(base_url, entry.category, &entry.document_number);
        let Some(record) = detail.fetch(&url, entry.category).await? else {
            stats.still_failing += 1;
            continue;
        };
        if store.record_exists(&record).await? {
            store
                .mark_ledger_parsed(entry.category, &entry.document_number)
                .await?;
            stats.already_persisted += 1;
            continue;
        }
        if record.is_persistable() {
            store.insert_record(&record).await?;
            store
                .mark_ledger_parsed(entry.category, &entry.document_number)
                .await?;
            stats.recovered += 1;
        } else {
            debug!(
                category = %entry.category,
                doc_number = %entry.document_number,
                "replayed record still fails validation"
            );
            stats.still_failing += 1;
        }
    }
    info!(?stats, "replay finished");
    Ok(stats)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImageStats {
    pub attempted: u32,
    pub attached: u32,
    pub failed: u32,
}

impl ImageStats {
    fn absorb(&mut self, other: ImageStats) {
        self.attempted += other.attempted;
        self.attached += other.attached;
        self.failed += other.failed;
    }
}

/// Attaches base64 imagery to records that were persisted without it.
///
/// Direct download of the stored image URL is tried first; records
/// without one (or whose download fails) get an element screenshot from a
/// pooled browser session instead.
#[derive(Clone)]
pub struct ImageBackfill<F, S> {
    factory: F,
    store: S,
    client: reqwest::Client,
    base_url: String,
    ui_wait: Duration,
    pool_size: usize,
}

impl<F, S> ImageBackfill<F, S>
where
    F: SessionFactory + Clone + Send + Sync + 'static,
    S: Store + Clone + 'static,
{
    /// # Errors
    ///
    /// Returns [`HarvestError::Http`] if the download client cannot be
    /// built.
    pub fn new(factory: F, store: S, config: &AppConfig) -> Result<Self, HarvestError> {
        Self::with_parts(
            factory,
            store,
            &config.detail_user_agent,
            &config.registry_base_url,
            Duration::from_secs(config.ui_wait_secs),
            config.image_pool_size,
        )
    }

    /// # Errors
    ///
    /// Returns [`HarvestError::Http`] if the download client cannot be
    /// built.
    pub fn with_parts(
        factory: F,
        store: S,
        user_agent: &str,
        base_url: &str,
        ui_wait: Duration,
        pool_size: usize,
    ) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            factory,
            store,
            client,
            base_url: base_url.to_owned(),
            ui_wait,
            pool_size: pool_size.max(1),
        })
    }

    /// Backfills every imagery-bearing category.
    ///
    /// # Errors
    ///
    /// Returns store and pool-construction failures; per-item failures
    /// are logged and counted, never fatal for the batch.
    pub async fn run(&self) -> Result<ImageStats, HarvestError> {
        let mut stats = ImageStats::default();
        for category in Category::all().filter(|c| c.has_imagery()) {
            stats.absorb(self.run_category(category).await?);
        }
        Ok(stats)
    }

    /// Backfills one category with a bounded worker pool.
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::run`].
    pub async fn run_category(&self, category: Category) -> Result<ImageStats, HarvestError> {
        let entries = self.store.list_entries_missing_image(category).await?;
        if entries.is_empty() {
            return Ok(ImageStats::default());
        }
        info!(category = %category, count = entries.len(), "backfilling images");

        let pool = Arc::new(
            SessionPool::new(&self.factory, self.pool_size.min(entries.len())).await?,
        );
        let mut tasks = Vec::with_capacity(entries.len());
        for entry in entries {
            let this = self.clone();
            let pool = Arc::clone(&pool);
            tasks.push(tokio::spawn(
                async move { this.backfill_one(&pool, &entry).await },
            ));
        }

        let mut stats = ImageStats::default();
        for task in tasks {
            stats.attempted += 1;
            match task.await {
                Ok(Ok(true)) => stats.attached += 1,
                Ok(Ok(false)) => stats.failed += 1,
                Ok(Err(e)) => {
                    warn!(category = %category, error = %e, "image backfill item failed");
                    stats.failed += 1;
                }
                Err(e) => {
                    warn!(category = %category, error = %e, "image backfill task failed");
                    stats.failed += 1;
                }
            }
        }
        pool.close().await;
        info!(category = %category, ?stats, "image backfill finished");
        Ok(stats)
    }

    async fn backfill_one(
        &self,
        pool: &SessionPool<F::Sess>,
        entry: &LedgerEntry,
    ) -> Result<bool, HarvestError> {
        let Some(record) = self
            .store
            .find_record_by_doc_number(&entry.document_number)
            .await?
        else {
            warn!(
                doc_number = %entry.document_number,
                "no persisted record for ledger entry, skipping"
            );
            return Ok(false);
        };

        if let Some(image_url) = &record.image_url {
            match download_image_base64(&self.client, image_url, &self.base_url).await {
                Ok(encoded) => {
                    self.store
                        .attach_attribute(record.id, IMAGE_ATTRIBUTE_LABEL, &encoded)
                        .await?;
                    return Ok(true);
                }
                Err(e) => {
                    debug!(image_url, error = %e, "direct download failed, taking a screenshot");
                }
            }
        }

        let session = pool.checkout().await?;
        let captured = self.capture(&session, entry).await;
        pool.checkin(session).await;

        let encoded = captured?;
        self.store
            .attach_attribute(record.id, IMAGE_ATTRIBUTE_LABEL, &encoded)
            .await?;
        Ok(true)
    }

    async fn capture(
        &self,
        session: &F::Sess,
        entry: &LedgerEntry,
    ) -> Result<String, HarvestError> {
        let url = detail_url(&self.base_url, entry.category, &entry.document_number);
        session.goto(&url).await?;
        session.wait_visible(DETAIL_INFO, self.ui_wait).await?;

        for selector in IMAGE_SELECTORS {
            if let Ok(element) = session.find(selector).await {
                return Ok(BASE64.encode(element.screenshot_png().await?));
            }
        }
        let fallback = session.find(DETAIL_INFO).await?;
        Ok(BASE64.encode(fallback.screenshot_png().await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{registry_with_empty_pages, FakeFactory, MemStore};
    use reestr_core::Record;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backfill(store: MemStore, base_url: &str, pool_size: usize) -> ImageBackfill<FakeFactory, MemStore> {
        ImageBackfill::with_parts(
            FakeFactory::new(registry_with_empty_pages(1)),
            store,
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
            base_url,
            Duration::ZERO,
            pool_size,
        )
        .unwrap()
    }

    fn trademark_record(doc_number: &str, image_url: Option<String>) -> Record {
        Record {
            status: Some("Действует".to_owned()),
            security_doc_number: Some(doc_number.to_owned()),
            doc_number: Some(doc_number.to_owned()),
            image_url,
            ..Record::for_category(Category::Trademark)
        }
    }

    fn detail_body(doc_number: &str) -> String {
        format!(
            r#"<div class="detial_plan_info"><ul>
                <li><strong>Статус</strong><span>Действует</span></li>
                <li><strong>№ охранного документа</strong><span>{doc_number}</span></li>
            </ul></div>"#
        )
    }

    #[tokio::test]
    async fn replay_recovers_marks_and_leaves_entries_correctly() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Invention/Details"))
            .and(query_param("docNumber", "111"))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_body("111")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Invention/Details"))
            .and(query_param("docNumber", "222"))
            .respond_with(ResponseTemplate::new(200).set_body_string(detail_body("222")))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Invention/Details"))
            .and(query_param("docNumber", "333"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = MemStore::new();
        // 222 was persisted on a previous run; its entry just never got marked
        store.seed_record(Record {
            status: Some("Действует".to_owned()),
            security_doc_number: Some("222".to_owned()),
            doc_number: Some("222".to_owned()),
            ..Record::for_category(Category::Invention)
        });
        store.seed_ledger(Category::Invention, "111", false);
        store.seed_ledger(Category::Invention, "222", false);
        store.seed_ledger(Category::Invention, "333", false);
        store.seed_ledger(Category::Invention, "999", true);

        let detail = DetailFetcher::new(
            store.clone(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
            Duration::from_secs(5),
            3,
            Duration::ZERO,
        )
        .unwrap();
        let stats = replay_failed(&detail, &store, &server.uri()).await.unwrap();

        // parsed entries are never re-attempted
        assert_eq!(stats.attempted, 3);
        assert_eq!(stats.recovered, 1);
        assert_eq!(stats.already_persisted, 1);
        assert_eq!(stats.still_failing, 1);

        let parsed: std::collections::HashMap<String, bool> = store
            .ledger_snapshot()
            .into_iter()
            .map(|e| (e.document_number, e.is_parsed))
            .collect();
        assert!(parsed["111"]);
        assert!(parsed["222"]);
        assert!(!parsed["333"]);
        assert!(parsed["999"]);
        assert_eq!(store.records_snapshot().len(), 2);
    }

    #[tokio::test]
    async fn prefers_direct_download_over_screenshot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/img/tm9.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![9u8]))
            .mount(&server)
            .await;

        let store = MemStore::new();
        let record = trademark_record("9", Some(format!("{}/img/tm9.png", server.uri())));
        let id = store.seed_record(record);
        store.seed_ledger(Category::Trademark, "9", true);

        let stats = backfill(store.clone(), &server.uri(), 2)
            .run_category(Category::Trademark)
            .await
            .unwrap();
        assert_eq!(stats.attached, 1);
        assert_eq!(stats.failed, 0);

        let attrs = store.attributes_snapshot();
        assert_eq!(attrs, vec![(id, IMAGE_ATTRIBUTE_LABEL.to_owned(), "CQ==".to_owned())]);
        // a second run finds nothing left to do
        let again = backfill(store.clone(), &server.uri(), 2)
            .run_category(Category::Trademark)
            .await
            .unwrap();
        assert_eq!(again.attempted, 0);
    }

    #[tokio::test]
    async fn large_batch_completes_within_the_pool_bound() {
        let store = MemStore::new();
        for n in 0..37 {
            let doc = format!("tm{n}");
            store.seed_record(trademark_record(&doc, None));
            store.seed_ledger(Category::Trademark, &doc, true);
        }

        let registry = registry_with_empty_pages(1);
        let service = ImageBackfill::with_parts(
            FakeFactory::new(std::sync::Arc::clone(&registry)),
            store.clone(),
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
            "https://gosreestr.kazpatent.kz/",
            Duration::ZERO,
            10,
        )
        .unwrap();

        let stats = service.run_category(Category::Trademark).await.unwrap();
        assert_eq!(stats.attempted, 37);
        assert_eq!(stats.attached, 37);
        // the pool pre-creates its sessions; no more than ten ever exist
        assert_eq!(registry.sessions_created(), 10);
        assert_eq!(
            store
                .attributes_snapshot()
                .iter()
                .filter(|(_, label, _)| label == IMAGE_ATTRIBUTE_LABEL)
                .count(),
            37
        );
    }

    #[tokio::test]
    async fn ledger_entry_without_record_is_not_scheduled() {
        let store = MemStore::new();
        store.seed_ledger(Category::Trademark, "ghost", false);

        let stats = backfill(store.clone(), "https://gosreestr.kazpatent.kz/", 2)
            .run_category(Category::Trademark)
            .await
            .unwrap();
        assert_eq!(stats.attempted, 0);
        assert!(store.attributes_snapshot().is_empty());
    }

    #[test]
    fn detail_url_is_rebuilt_from_category_and_number() {
        assert_eq!(
            detail_url("https://gosreestr.kazpatent.kz/", Category::UtilityModel, "101"),
            "https://gosreestr.kazpatent.kz/UtilityModel/Details?docNumber=101"
        );
    }
}
