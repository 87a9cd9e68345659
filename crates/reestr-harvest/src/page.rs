//! Per-page harvesting: scroll the lazy-loaded card list out, read each
//! card, fetch its detail page, and persist what survives the dedup gate
//! and the validator.

use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use reestr_core::{extract_summary, Category, Store};

use crate::crawl::{selectors, Crawler};
use crate::driver::{Element, Session, SessionFactory};
use crate::error::HarvestError;
use crate::retry::with_retry;

/// Scroll rounds before giving up on the card list growing further.
const MAX_SCROLL_ROUNDS: u32 = 25;

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct PageStats {
    pub cards: u32,
    pub inserted: u32,
    pub skipped_existing: u32,
    pub rejected: u32,
}

enum CardOutcome {
    Inserted,
    SkippedExisting,
    Rejected,
    /// The detail page could not be fetched; the fetcher already decided
    /// whether that left a ledger entry behind.
    DetailFailed,
    NoDetailLink,
}

impl PageStats {
    fn absorb(&mut self, outcome: &CardOutcome) {
        self.cards += 1;
        match outcome {
            CardOutcome::Inserted => self.inserted += 1,
            CardOutcome::SkippedExisting => self.skipped_existing += 1,
            CardOutcome::Rejected => self.rejected += 1,
            CardOutcome::DetailFailed | CardOutcome::NoDetailLink => {}
        }
    }
}

impl<F, S> Crawler<F, S>
where
    F: SessionFactory + Clone + Send + Sync + 'static,
    S: Store + Clone + 'static,
{
    /// Harvests the currently displayed page.
    pub(crate) async fn harvest_page(
        &self,
        session: &F::Sess,
        category: Category,
        page: u32,
    ) -> Result<PageStats, HarvestError> {
        session
            .wait_visible(selectors::MAIN_TABLE, self.settings.ui_wait)
            .await?;
        self.settle_scroll(session).await?;

        let card_count = session.find_all(selectors::CARD).await?.len();
        debug!(category = %category, page, card_count, "harvesting page");

        let mut stats = PageStats::default();
        for index in 0..card_count {
            match self.process_card(session, category, index).await {
                Ok(outcome) => stats.absorb(&outcome),
                // a broken card never takes the page down with it
                Err(e) => {
                    warn!(category = %category, page, index, error = %e, "abandoning card");
                }
            }
        }
        Ok(stats)
    }

    /// Scrolls to the bottom until the document height stops growing, so
    /// every lazy-loaded card is in the DOM before collection starts.
    async fn settle_scroll(&self, session: &F::Sess) -> Result<(), HarvestError> {
        with_retry(
            self.settings.retry_max_attempts,
            self.settings.retry_delay,
            || async {
                let mut height = session.scroll_height().await?;
                for _ in 0..MAX_SCROLL_ROUNDS {
                    session.scroll_to_bottom().await?;
                    tokio::time::sleep(self.settings.scroll_settle).await;
                    let next = session.scroll_height().await?;
                    if next == height {
                        return Ok(());
                    }
                    height = next;
                }
                Ok(())
            },
            || async {
                let _ = session.dismiss_alert().await;
            },
        )
        .await
    }

    /// Processes the card at `index`: summary extraction, detail fetch,
    /// merge, dedup gate, validation, persistence.
    async fn process_card(
        &self,
        session: &F::Sess,
        category: Category,
        index: usize,
    ) -> Result<CardOutcome, HarvestError> {
        // The card list re-renders under us; re-collect on staleness and
        // re-scroll so the card is back in the DOM.
        let (text, href) = with_retry(
            self.settings.retry_max_attempts,
            self.settings.retry_delay,
            || async {
                let cards = session.find_all(selectors::CARD).await?;
                let Some(card) = cards.get(index) else {
                    return Err(HarvestError::StaleReference(format!(
                        "card {index} vanished from the list"
                    )));
                };
                let text = card.text().await?;
                let href = detail_href(&card.inner_html().await?);
                Ok((text, href))
            },
            || async {
                let _ = session.dismiss_alert().await;
                let _ = session.scroll_to_bottom().await;
            },
        )
        .await?;

        let Some(href) = href else {
            warn!(category = %category, index, "card has no detail link, skipping");
            return Ok(CardOutcome::NoDetailLink);
        };
        let url = self.resolve_detail_url(&href)?;

        let mut record = extract_summary(&text, category);
        let Some(detail) = self.detail.fetch(&url, category).await? else {
            return Ok(CardOutcome::DetailFailed);
        };
        record.merge_detail(detail);

        if self.store.record_exists(&record).await? {
            debug!(key = record.log_key(), "record already persisted, skipping");
            return Ok(CardOutcome::SkippedExisting);
        }

        let doc_number = record.doc_number.clone();
        if record.is_persistable() {
            let id = self.store.insert_record(&record).await?;
            if let Some(doc_number) = &doc_number {
                self.store
                    .save_ledger_entry(category, doc_number, true)
                    .await?;
            }
            debug!(id, key = record.log_key(), "persisted record");
            Ok(CardOutcome::Inserted)
        } else {
            warn!(key = record.log_key(), "record failed validation");
            if let Some(doc_number) = &doc_number {
                self.store
                    .save_ledger_entry(category, doc_number, false)
                    .await?;
            }
            Ok(CardOutcome::Rejected)
        }
    }

    fn resolve_detail_url(&self, href: &str) -> Result<String, HarvestError> {
        if let Ok(absolute) = Url::parse(href) {
            return Ok(absolute.to_string());
        }
        Url::parse(&self.settings.base_url)
            .and_then(|base| base.join(href))
            .map(|u| u.to_string())
            .map_err(|e| HarvestError::Driver(format!("cannot resolve detail link {href}: {e}")))
    }
}

/// First link target inside a card's markup.
fn detail_href(html: &str) -> Option<String> {
    let fragment = Html::parse_fragment(html);
    let selector = Selector::parse("a[href]").ok()?;
    fragment
        .select(&selector)
        .next()
        .and_then(|a| a.value().attr("href"))
        .map(str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_href_takes_the_first_link() {
        let html = r#"<p>Название: X</p>
            <a href="/Trademark/Details?docNumber=1">детальнее</a>
            <a href="/other">прочее</a>"#;
        assert_eq!(
            detail_href(html).as_deref(),
            Some("/Trademark/Details?docNumber=1")
        );
    }

    #[test]
    fn detail_href_is_none_for_linkless_cards() {
        assert_eq!(detail_href("<p>Название: X</p>"), None);
    }
}
