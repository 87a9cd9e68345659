//! Crawl orchestrator: drives the registry UI through category selection,
//! view setup, and the page-by-page sweep in one or both directions.

use std::time::Duration;

use tracing::{debug, info, warn};

use reestr_core::{AppConfig, Category, Store};

use crate::detail::DetailFetcher;
use crate::driver::{Element, Session, SessionFactory};
use crate::error::HarvestError;
use crate::page::PageStats;
use crate::retry::with_retry;

/// Assumed page count when the pager cannot be read. High enough to sweep
/// any category the registry currently holds to its true end (the pager
/// button disappearing stops the sweep first).
const LAST_PAGE_FALLBACK: u32 = 1_000;

/// Consecutive whole-page failures tolerated before a sweep is abandoned.
const MAX_CONSECUTIVE_PAGE_FAILURES: u32 = 3;

/// DevExpress element selectors of the registry front end.
pub(crate) mod selectors {
    /// Loading overlays that block interaction between steps.
    pub(crate) const LOADING_PANELS: [&str; 2] = ["#LoadingPanel_LD", "#cvReestr_LD"];
    pub(crate) const MAIN_TABLE: &str = "#cvReestr_DXMainTable";
    pub(crate) const CARD: &str = "div.dxcvFlowCard_Material";
    pub(crate) const CATEGORY_DROPDOWN: &str = "#cbReestrType_B-1";
    pub(crate) const CATEGORY_INPUT: &str = "#cbReestrType_I";
    pub(crate) const SEARCH_BUTTON: &str = "#btnSearch";
    pub(crate) const TEXT_VIEW_BUTTON: &str = "button[data-view='2']";
    pub(crate) const PAGE_SIZE_BUTTON: &str = "#cvReestr_DXPagerTop_PSB";
    /// Fifth entry of the page-size popup: 200 cards per page.
    pub(crate) const PAGE_SIZE_200_ITEM: &str = "#cvReestr_DXPagerTop_PSP_DXI4_";
    pub(crate) const PAGE_NUMBER_LINKS: &str = "a.dxp-num.dxRoundRippleTarget.dxRippleTarget";
    pub(crate) const PAGER_BUTTONS: &str =
        "a.dxp-button.dxp-bi.dxRoundRippleTarget.dxRippleTarget";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

impl Direction {
    /// Class of the `img` inside the pager button that steps this way.
    pub(crate) fn marker_class(self) -> &'static str {
        match self {
            Direction::Forward => "dxWeb_pNext_Material",
            Direction::Backward => "dxWeb_pPrev_Material",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Forward => f.write_str("forward"),
            Direction::Backward => f.write_str("backward"),
        }
    }
}

/// Crawl tuning knobs, derived from [`AppConfig`] in production.
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub base_url: String,
    pub ui_wait: Duration,
    pub retry_max_attempts: u32,
    pub retry_delay: Duration,
    /// Pause between scroll rounds while the lazy-loaded card list grows.
    pub scroll_settle: Duration,
}

impl CrawlSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.registry_base_url.clone(),
            ui_wait: Duration::from_secs(config.ui_wait_secs),
            retry_max_attempts: config.retry_max_attempts,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
            scroll_settle: Duration::from_secs(2),
        }
    }
}

/// Totals across one or more page sweeps.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub pages: u32,
    pub cards: u32,
    pub inserted: u32,
    pub skipped_existing: u32,
    pub rejected: u32,
}

impl SweepStats {
    pub(crate) fn absorb_page(&mut self, page: PageStats) {
        self.pages += 1;
        self.cards += page.cards;
        self.inserted += page.inserted;
        self.skipped_existing += page.skipped_existing;
        self.rejected += page.rejected;
    }

    fn absorb(&mut self, other: SweepStats) {
        self.pages += other.pages;
        self.cards += other.cards;
        self.inserted += other.inserted;
        self.skipped_existing += other.skipped_existing;
        self.rejected += other.rejected;
    }
}

/// Drives registry sessions through whole-category crawls.
#[derive(Clone)]
pub struct Crawler<F, S> {
    pub(crate) factory: F,
    pub(crate) store: S,
    pub(crate) detail: DetailFetcher<S>,
    pub(crate) settings: CrawlSettings,
}

impl<F, S> Crawler<F, S>
where
    F: SessionFactory + Clone + Send + Sync + 'static,
    S: Store + Clone + 'static,
{
    pub fn new(factory: F, store: S, detail: DetailFetcher<S>, settings: CrawlSettings) -> Self {
        Self {
            factory,
            store,
            detail,
            settings,
        }
    }

    /// Crawls one category front to back.
    ///
    /// # Errors
    ///
    /// Returns the first category-level failure; per-card failures only
    /// abandon the card and whole-page failures are tolerated up to
    /// [`MAX_CONSECUTIVE_PAGE_FAILURES`] in a row.
    pub async fn run_category(&self, category: Category) -> Result<SweepStats, HarvestError> {
        self.run_category_from(category, Direction::Forward).await
    }

    /// Crawls one category in the given direction (backward starts at the
    /// last page and pages toward the front).
    ///
    /// # Errors
    ///
    /// Same contract as [`Self::run_category`].
    pub async fn run_category_from(
        &self,
        category: Category,
        direction: Direction,
    ) -> Result<SweepStats, HarvestError> {
        let session = self.open_session().await?;
        let result = async {
            self.setup_category(&session, category).await?;
            let last_page = self.last_page(&session).await;
            match direction {
                Direction::Forward => {
                    self.sweep(&session, category, direction, 1, last_page).await
                }
                Direction::Backward => {
                    self.step_to_last_page(&session).await?;
                    self.sweep(&session, category, direction, last_page, 0).await
                }
            }
        }
        .await;
        session.close().await;
        let stats = result?;
        info!(category = %category, %direction, ?stats, "category crawl finished");
        Ok(stats)
    }

    /// Crawls one category from both ends at once.
    ///
    /// The page count is read once, up front, and shared: the forward
    /// sweep covers pages `1..=last_page/2`, a second session sweeps
    /// `last_page..last_page/2` backward, and both must finish before the
    /// category is considered complete.
    ///
    /// # Errors
    ///
    /// Fails if either sweep fails; the surviving sweep is still joined
    /// first.
    pub async fn run_category_both(&self, category: Category) -> Result<SweepStats, HarvestError> {
        let forward_session = self.open_session().await?;
        let prepared = async {
            self.setup_category(&forward_session, category).await?;
            Ok::<u32, HarvestError>(self.last_page(&forward_session).await)
        }
        .await;
        let last_page = match prepared {
            Ok(last_page) => last_page,
            Err(e) => {
                forward_session.close().await;
                return Err(e);
            }
        };
        let stopping_page = last_page / 2;
        info!(
            category = %category,
            last_page,
            stopping_page,
            "starting bidirectional crawl"
        );

        let crawler = self.clone();
        let backward = tokio::spawn(async move {
            let session = crawler.open_session().await?;
            let result = async {
                crawler.setup_category(&session, category).await?;
                crawler.step_to_last_page(&session).await?;
                crawler
                    .sweep(&session, category, Direction::Backward, last_page, stopping_page)
                    .await
            }
            .await;
            session.close().await;
            result
        });

        let forward_result = self
            .sweep(
                &forward_session,
                category,
                Direction::Forward,
                1,
                stopping_page,
            )
            .await;
        forward_session.close().await;

        let backward_result = backward
            .await
            .map_err(|e| HarvestError::Driver(format!("backward sweep task failed: {e}")))?;

        let mut stats = forward_result?;
        stats.absorb(backward_result?);
        info!(category = %category, ?stats, "bidirectional crawl finished");
        Ok(stats)
    }

    /// Crawls every category in crawl order, one direction. A category
    /// whose setup or sweep fails is logged and skipped, never fatal.
    pub async fn run_all_categories(&self, direction: Direction) -> SweepStats {
        let mut stats = SweepStats::default();
        for category in Category::all() {
            match self.run_category_from(category, direction).await {
                Ok(s) => stats.absorb(s),
                Err(e) => warn!(category = %category, error = %e, "category crawl failed, continuing"),
            }
        }
        stats
    }

    /// Crawls every category bidirectionally.
    pub async fn run_all_categories_both(&self) -> SweepStats {
        let mut stats = SweepStats::default();
        for category in Category::all() {
            match self.run_category_both(category).await {
                Ok(s) => stats.absorb(s),
                Err(e) => warn!(category = %category, error = %e, "category crawl failed, continuing"),
            }
        }
        stats
    }

    pub(crate) async fn open_session(&self) -> Result<F::Sess, HarvestError> {
        let session = self.factory.create().await?;
        session.goto(&self.settings.base_url).await?;
        Ok(session)
    }

    /// Selects the category, switches to the text view, and sets the page
    /// size to 200 cards.
    pub(crate) async fn setup_category(
        &self,
        session: &F::Sess,
        category: Category,
    ) -> Result<(), HarvestError> {
        self.select_category(session, category)
            .await
            .map_err(|e| HarvestError::CategorySetup {
                category: category.as_str(),
                reason: e.to_string(),
            })?;
        self.switch_to_text_view(session)
            .await
            .map_err(|e| HarvestError::CategorySetup {
                category: category.as_str(),
                reason: format!("text view switch: {e}"),
            })?;
        self.set_page_size(session)
            .await
            .map_err(|e| HarvestError::CategorySetup {
                category: category.as_str(),
                reason: format!("page size: {e}"),
            })
    }

    async fn select_category(
        &self,
        session: &F::Sess,
        category: Category,
    ) -> Result<(), HarvestError> {
        let ui = self.settings.ui_wait;
        session
            .find(selectors::CATEGORY_DROPDOWN)
            .await?
            .click()
            .await?;
        let item = format!("#{}", category.selector_id());
        session.wait_visible(&item, ui).await?;
        session.find(&item).await?.click().await?;
        session
            .wait_value_contains(selectors::CATEGORY_INPUT, category.display_name(), ui)
            .await?;
        self.await_overlays(session).await?;
        session
            .find(selectors::SEARCH_BUTTON)
            .await?
            .click()
            .await?;
        self.await_overlays(session).await?;
        session.wait_visible(selectors::MAIN_TABLE, ui).await
    }

    async fn switch_to_text_view(&self, session: &F::Sess) -> Result<(), HarvestError> {
        let button = session.find(selectors::TEXT_VIEW_BUTTON).await?;
        button.scroll_into_view().await?;
        button.js_click().await?;
        self.await_overlays(session).await
    }

    async fn set_page_size(&self, session: &F::Sess) -> Result<(), HarvestError> {
        let ui = self.settings.ui_wait;
        session
            .find(selectors::PAGE_SIZE_BUTTON)
            .await?
            .click()
            .await?;
        session.wait_visible(selectors::PAGE_SIZE_200_ITEM, ui).await?;
        session
            .find(selectors::PAGE_SIZE_200_ITEM)
            .await?
            .click()
            .await?;
        self.await_overlays(session).await?;
        session.wait_visible(selectors::MAIN_TABLE, ui).await
    }

    pub(crate) async fn await_overlays(&self, session: &F::Sess) -> Result<(), HarvestError> {
        for panel in selectors::LOADING_PANELS {
            session.wait_invisible(panel, self.settings.ui_wait).await?;
        }
        Ok(())
    }

    /// Reads the highest page number from the pager. Falls back to
    /// [`LAST_PAGE_FALLBACK`] when the pager is absent or unreadable.
    pub(crate) async fn last_page(&self, session: &F::Sess) -> u32 {
        let links = match session.find_all(selectors::PAGE_NUMBER_LINKS).await {
            Ok(links) => links,
            Err(e) => {
                warn!(error = %e, "could not read pager, assuming fallback page count");
                return LAST_PAGE_FALLBACK;
            }
        };
        let Some(last) = links.last() else {
            warn!("pager has no page numbers, assuming fallback page count");
            return LAST_PAGE_FALLBACK;
        };
        match last.text().await {
            Ok(text) => text.trim().parse().unwrap_or_else(|_| {
                warn!(text = %text, "unparseable last page number, assuming fallback");
                LAST_PAGE_FALLBACK
            }),
            Err(e) => {
                warn!(error = %e, "could not read last page number, assuming fallback");
                LAST_PAGE_FALLBACK
            }
        }
    }

    /// Jumps to the last page by clicking the highest numbered pager link.
    async fn step_to_last_page(&self, session: &F::Sess) -> Result<(), HarvestError> {
        let links = session.find_all(selectors::PAGE_NUMBER_LINKS).await?;
        let Some(last) = links.last() else {
            // single page, already there
            return Ok(());
        };
        last.scroll_into_view().await?;
        last.js_click().await?;
        self.await_overlays(session).await
    }

    /// Clicks the pager button stepping one page in `direction`. Returns
    /// `false` when no such button exists (the end of the pager).
    async fn advance(
        &self,
        session: &F::Sess,
        direction: Direction,
    ) -> Result<bool, HarvestError> {
        let buttons = session.find_all(selectors::PAGER_BUTTONS).await?;
        for button in &buttons {
            if button.inner_html().await?.contains(direction.marker_class()) {
                button.scroll_into_view().await?;
                button.js_click().await?;
                self.await_overlays(session).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Harvest/advance loop from `start_page` until `stopping_page` is
    /// reached or the pager runs out of buttons.
    pub(crate) async fn sweep(
        &self,
        session: &F::Sess,
        category: Category,
        direction: Direction,
        start_page: u32,
        stopping_page: u32,
    ) -> Result<SweepStats, HarvestError> {
        let mut page = start_page;
        let mut consecutive_failures = 0u32;
        let mut stats = SweepStats::default();

        loop {
            match self.harvest_page(session, category, page).await {
                Ok(page_stats) => {
                    consecutive_failures = 0;
                    stats.absorb_page(page_stats);
                }
                Err(e) => {
                    consecutive_failures += 1;
                    warn!(
                        category = %category,
                        page,
                        consecutive_failures,
                        error = %e,
                        "page harvest failed"
                    );
                    if consecutive_failures >= MAX_CONSECUTIVE_PAGE_FAILURES {
                        return Err(e);
                    }
                }
            }

            let done = match direction {
                Direction::Forward => page >= stopping_page,
                Direction::Backward => page.saturating_sub(1) <= stopping_page,
            };
            if done {
                break;
            }

            let advanced = with_retry(
                self.settings.retry_max_attempts,
                self.settings.retry_delay,
                || async { self.advance(session, direction).await },
                || async {
                    let _ = session.dismiss_alert().await;
                },
            )
            .await?;
            if !advanced {
                debug!(category = %category, page, "pager exhausted before stopping page");
                break;
            }
            page = match direction {
                Direction::Forward => page + 1,
                Direction::Backward => page.saturating_sub(1).max(1),
            };
        }

        Ok(stats)
    }
}
