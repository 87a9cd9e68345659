//! Detail-page fetcher.
//!
//! Detail pages are server-rendered plain HTML, so they are fetched over
//! HTTP instead of through a browser session. Field rows live in
//! `div.detial_plan_info` (the typo is the registry's own) as
//! `<li><strong>label</strong><span>value</span></li>` pairs.

use std::time::Duration;

use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use reestr_core::fields::{apply_core_field, strip_parenthetical};
use reestr_core::{doc_number_from_url, Category, ExtensionAttribute, Record, Store};

use crate::error::HarvestError;

/// Labels whose value is a link to the full abstract document rather than
/// inline text. The absolute href is stored as the attribute value.
const ABSTRACT_LABELS: [&str; 2] = ["Реферат/Описание", "Описания"];

#[derive(Clone)]
struct DetailSelectors {
    rows: Selector,
    label: Selector,
    value: Selector,
    value_link: Selector,
    image: Selector,
}

impl DetailSelectors {
    fn new() -> Result<Self, HarvestError> {
        let parse =
            |s: &str| Selector::parse(s).map_err(|e| HarvestError::Selector(e.to_string()));
        Ok(Self {
            rows: parse("div.detial_plan_info ul li")?,
            label: parse("strong")?,
            value: parse("span")?,
            value_link: parse("span a")?,
            image: parse("div.plan_img5 img, div.plan_img img")?,
        })
    }
}

/// Fetches and parses one registry detail page.
///
/// Failure policy: a timeout is retried up to `max_attempts` times with a
/// fixed delay and then gives up silently (the summary sweep will pass
/// this document again). Any other HTTP failure writes an unparsed ledger
/// entry so the replay service can pick the document up later.
#[derive(Clone)]
pub struct DetailFetcher<S> {
    client: reqwest::Client,
    store: S,
    max_attempts: u32,
    retry_delay: Duration,
    selectors: DetailSelectors,
}

impl<S: Store> DetailFetcher<S> {
    /// # Errors
    ///
    /// Returns [`HarvestError::Http`] if the HTTP client cannot be built.
    pub fn new(
        store: S,
        user_agent: &str,
        timeout: Duration,
        max_attempts: u32,
        retry_delay: Duration,
    ) -> Result<Self, HarvestError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            store,
            max_attempts: max_attempts.max(1),
            retry_delay,
            selectors: DetailSelectors::new()?,
        })
    }

    /// Fetches `url` and parses it into a record for `category`.
    ///
    /// Returns `Ok(None)` when the page could not be obtained; in that
    /// case a ledger entry has been written unless the failure was a
    /// plain timeout.
    ///
    /// # Errors
    ///
    /// Returns [`HarvestError::Store`] if the failure ledger cannot be
    /// written.
    pub async fn fetch(&self, url: &str, category: Category) -> Result<Option<Record>, HarvestError> {
        let doc_number = doc_number_from_url(url).to_owned();
        let mut attempt = 1u32;
        loop {
            match self.client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        warn!(url, status = status.as_u16(), "detail page returned an error status");
                        self.store
                            .save_ledger_entry(category, &doc_number, false)
                            .await?;
                        return Ok(None);
                    }
                    match response.text().await {
                        Ok(body) => return Ok(Some(self.parse_detail(&body, url, category))),
                        Err(e) => {
                            warn!(url, error = %e, "failed to read detail page body");
                            self.store
                                .save_ledger_entry(category, &doc_number, false)
                                .await?;
                            return Ok(None);
                        }
                    }
                }
                Err(e) if e.is_timeout() => {
                    if attempt >= self.max_attempts {
                        warn!(url, attempt, "detail fetch timed out, giving up");
                        return Ok(None);
                    }
                    debug!(url, attempt, "detail fetch timed out, retrying");
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(url, error = %e, "detail fetch failed");
                    self.store
                        .save_ledger_entry(category, &doc_number, false)
                        .await?;
                    return Ok(None);
                }
            }
        }
    }

    /// Parses a detail page body into a record.
    ///
    /// Known labels are routed to their typed fields; everything else
    /// becomes an extension attribute in document order. Labels are
    /// matched after stripping their parenthetical qualifiers.
    fn parse_detail(&self, html: &str, url: &str, category: Category) -> Record {
        let doc = Html::parse_document(html);
        let base = Url::parse(url).ok();
        let mut record = Record::for_category(category);
        record.doc_number = Some(doc_number_from_url(url).to_owned());

        for row in doc.select(&self.selectors.rows) {
            let Some(label_el) = row.select(&self.selectors.label).next() else {
                continue;
            };
            let label = strip_parenthetical(&collapse_text(label_el.text()));
            if label.is_empty() {
                continue;
            }

            let value = if ABSTRACT_LABELS.contains(&label.as_str()) {
                row.select(&self.selectors.value_link)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .and_then(|href| absolutize(base.as_ref(), href))
                    .unwrap_or_default()
            } else {
                row.select(&self.selectors.value)
                    .next()
                    .map(|span| collapse_text(span.text()))
                    .unwrap_or_default()
            };
            if value.is_empty() {
                continue;
            }

            if !apply_core_field(&mut record, &label, &value) {
                record
                    .extension_attributes
                    .push(ExtensionAttribute { label, value });
            }
        }

        if let Some(img) = doc.select(&self.selectors.image).next() {
            if let Some(src) = img.value().attr("src") {
                record.image_url = absolutize(base.as_ref(), src);
            }
        }

        record
    }
}

fn collapse_text<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn absolutize(base: Option<&Url>, href: &str) -> Option<String> {
    match base {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}
