//! In-memory store and scripted registry fakes shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reestr_core::{
    Category, LedgerEntry, Record, RecordRef, Store, StoreError, IMAGE_ATTRIBUTE_LABEL,
};

use crate::crawl::{selectors, CrawlSettings, Crawler};
use crate::detail::DetailFetcher;
use crate::driver::{Element, Session, SessionFactory};
use crate::error::HarvestError;

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemStoreInner {
    next_id: i64,
    records: Vec<(i64, Record)>,
    attributes: Vec<(i64, String, String)>,
    ledger: Vec<LedgerEntry>,
}

#[derive(Clone, Default)]
pub(crate) struct MemStore {
    inner: Arc<Mutex<MemStoreInner>>,
}

impl MemStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn seed_record(&self, record: Record) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        for attr in &record.extension_attributes {
            inner
                .attributes
                .push((id, attr.label.clone(), attr.value.clone()));
        }
        inner.records.push((id, record));
        id
    }

    pub(crate) fn seed_ledger(&self, category: Category, document_number: &str, is_parsed: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.ledger.push(LedgerEntry {
            category,
            document_number: document_number.to_owned(),
            is_parsed,
        });
    }

    pub(crate) fn records_snapshot(&self) -> Vec<Record> {
        let inner = self.inner.lock().unwrap();
        inner.records.iter().map(|(_, r)| r.clone()).collect()
    }

    pub(crate) fn ledger_snapshot(&self) -> Vec<LedgerEntry> {
        self.inner.lock().unwrap().ledger.clone()
    }

    pub(crate) fn attributes_snapshot(&self) -> Vec<(i64, String, String)> {
        self.inner.lock().unwrap().attributes.clone()
    }
}

impl Store for MemStore {
    async fn record_exists(&self, record: &Record) -> Result<bool, StoreError> {
        let Some(identity) = record.identity_number() else {
            return Ok(false);
        };
        let inner = self.inner.lock().unwrap();
        Ok(inner.records.iter().any(|(_, r)| {
            r.category == record.category
                && r.site == record.site
                && r.identity_number() == Some(identity)
        }))
    }

    async fn insert_record(&self, record: &Record) -> Result<i64, StoreError> {
        Ok(self.seed_record(record.clone()))
    }

    async fn find_record_by_doc_number(
        &self,
        doc_number: &str,
    ) -> Result<Option<RecordRef>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .records
            .iter()
            .find(|(_, r)| r.doc_number.as_deref() == Some(doc_number))
            .map(|(id, r)| RecordRef {
                id: *id,
                image_url: r.image_url.clone(),
            }))
    }

    async fn attach_attribute(
        &self,
        record_id: i64,
        label: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .attributes
            .push((record_id, label.to_owned(), value.to_owned()));
        Ok(())
    }

    async fn save_ledger_entry(
        &self,
        category: Category,
        document_number: &str,
        is_parsed: bool,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner
            .ledger
            .iter_mut()
            .find(|e| e.category == category && e.document_number == document_number)
        {
            existing.is_parsed = existing.is_parsed || is_parsed;
        } else {
            inner.ledger.push(LedgerEntry {
                category,
                document_number: document_number.to_owned(),
                is_parsed,
            });
        }
        Ok(())
    }

    async fn mark_ledger_parsed(
        &self,
        category: Category,
        document_number: &str,
    ) -> Result<(), StoreError> {
        self.save_ledger_entry(category, document_number, true).await
    }

    async fn list_unparsed_entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .ledger
            .iter()
            .filter(|e| !e.is_parsed)
            .cloned()
            .collect())
    }

    async fn list_entries_missing_image(
        &self,
        category: Category,
    ) -> Result<Vec<LedgerEntry>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .ledger
            .iter()
            .filter(|e| e.category == category)
            .filter(|e| {
                inner
                    .records
                    .iter()
                    .find(|(_, r)| {
                        r.category == e.category
                            && r.doc_number.as_deref() == Some(e.document_number.as_str())
                    })
                    .is_some_and(|(id, _)| {
                        !inner
                            .attributes
                            .iter()
                            .any(|(rid, label, _)| rid == id && label == IMAGE_ATTRIBUTE_LABEL)
                    })
            })
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Scripted registry
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub(crate) struct FakeCard {
    pub text: String,
    pub href: String,
}

/// A scripted paged registry shared by every fake session.
pub(crate) struct FakeRegistry {
    last_page: u32,
    cards: HashMap<u32, Vec<FakeCard>>,
    visits: Mutex<Vec<(usize, u32)>>,
    sessions: AtomicUsize,
}

impl FakeRegistry {
    pub(crate) fn new(last_page: u32, cards: HashMap<u32, Vec<FakeCard>>) -> Self {
        Self {
            last_page,
            cards,
            visits: Mutex::new(Vec::new()),
            sessions: AtomicUsize::new(0),
        }
    }

    pub(crate) fn sessions_created(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    /// Pages each session harvested, in visit order.
    pub(crate) fn visits_by_session(&self) -> HashMap<usize, Vec<u32>> {
        let visits = self.visits.lock().unwrap();
        let mut grouped: HashMap<usize, Vec<u32>> = HashMap::new();
        for (session, page) in visits.iter() {
            grouped.entry(*session).or_default().push(*page);
        }
        grouped
    }

    fn record_visit(&self, session: usize, page: u32) {
        let mut visits = self.visits.lock().unwrap();
        let repeat = visits
            .iter()
            .rev()
            .find(|(s, _)| *s == session)
            .is_some_and(|(_, p)| *p == page);
        if !repeat {
            visits.push((session, page));
        }
    }
}

pub(crate) fn registry_with_empty_pages(last_page: u32) -> Arc<FakeRegistry> {
    Arc::new(FakeRegistry::new(last_page, HashMap::new()))
}

#[derive(Clone)]
pub(crate) struct FakeFactory {
    registry: Arc<FakeRegistry>,
}

impl FakeFactory {
    pub(crate) fn new(registry: Arc<FakeRegistry>) -> Self {
        Self { registry }
    }
}

impl SessionFactory for FakeFactory {
    type Sess = FakeSession;

    async fn create(&self) -> Result<FakeSession, HarvestError> {
        let id = self.registry.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSession {
            id,
            registry: Arc::clone(&self.registry),
            page: Arc::new(Mutex::new(1)),
        })
    }
}

pub(crate) struct FakeSession {
    id: usize,
    registry: Arc<FakeRegistry>,
    page: Arc<Mutex<u32>>,
}

impl FakeSession {
    fn current_page(&self) -> u32 {
        *self.page.lock().unwrap()
    }

    fn element(&self, kind: Kind) -> FakeElement {
        FakeElement {
            kind,
            page: Arc::clone(&self.page),
            last_page: self.registry.last_page,
        }
    }
}

impl Session for FakeSession {
    type Elem = FakeElement;

    async fn goto(&self, _url: &str) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn find(&self, _selector: &str) -> Result<FakeElement, HarvestError> {
        Ok(self.element(Kind::Control))
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<FakeElement>, HarvestError> {
        let page = self.current_page();
        if selector == selectors::CARD {
            self.registry.record_visit(self.id, page);
            let cards = self.registry.cards.get(&page).cloned().unwrap_or_default();
            return Ok(cards
                .into_iter()
                .map(|card| {
                    self.element(Kind::Card {
                        text: card.text,
                        html: format!("<a href=\"{}\">детальнее</a>", card.href),
                    })
                })
                .collect());
        }
        if selector == selectors::PAGE_NUMBER_LINKS {
            return Ok((1..=self.registry.last_page)
                .map(|n| self.element(Kind::PageNumber(n)))
                .collect());
        }
        if selector == selectors::PAGER_BUTTONS {
            let mut buttons = Vec::new();
            if page > 1 {
                buttons.push(self.element(Kind::Pager {
                    delta: -1,
                    marker: "dxWeb_pPrev_Material",
                }));
            }
            if page < self.registry.last_page {
                buttons.push(self.element(Kind::Pager {
                    delta: 1,
                    marker: "dxWeb_pNext_Material",
                }));
            }
            return Ok(buttons);
        }
        Ok(Vec::new())
    }

    async fn wait_visible(&self, _selector: &str, _timeout: Duration) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn wait_invisible(
        &self,
        _selector: &str,
        _timeout: Duration,
    ) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn wait_value_contains(
        &self,
        _selector: &str,
        _needle: &str,
        _timeout: Duration,
    ) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn scroll_height(&self) -> Result<i64, HarvestError> {
        Ok(0)
    }

    async fn scroll_to_bottom(&self) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn dismiss_alert(&self) -> Result<bool, HarvestError> {
        Ok(false)
    }

    async fn close(&self) {}
}

enum Kind {
    Control,
    Card { text: String, html: String },
    PageNumber(u32),
    Pager { delta: i64, marker: &'static str },
}

pub(crate) struct FakeElement {
    kind: Kind,
    page: Arc<Mutex<u32>>,
    last_page: u32,
}

impl FakeElement {
    fn apply_click(&self) {
        match self.kind {
            Kind::PageNumber(n) => *self.page.lock().unwrap() = n,
            Kind::Pager { delta, .. } => {
                let mut page = self.page.lock().unwrap();
                let next = i64::from(*page) + delta;
                *page = u32::try_from(next.clamp(1, i64::from(self.last_page))).unwrap_or(1);
            }
            Kind::Control | Kind::Card { .. } => {}
        }
    }
}

impl Element for FakeElement {
    async fn text(&self) -> Result<String, HarvestError> {
        Ok(match &self.kind {
            Kind::Card { text, .. } => text.clone(),
            Kind::PageNumber(n) => n.to_string(),
            Kind::Control | Kind::Pager { .. } => String::new(),
        })
    }

    async fn inner_html(&self) -> Result<String, HarvestError> {
        Ok(match &self.kind {
            Kind::Card { html, .. } => html.clone(),
            Kind::Pager { marker, .. } => format!("<img class=\"{marker}\"/>"),
            Kind::Control | Kind::PageNumber(_) => String::new(),
        })
    }

    async fn click(&self) -> Result<(), HarvestError> {
        self.apply_click();
        Ok(())
    }

    async fn js_click(&self) -> Result<(), HarvestError> {
        self.apply_click();
        Ok(())
    }

    async fn scroll_into_view(&self) -> Result<(), HarvestError> {
        Ok(())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, HarvestError> {
        // PNG signature bytes, enough for an encode round-trip
        Ok(vec![0x89, 0x50, 0x4E, 0x47])
    }
}

// ---------------------------------------------------------------------------
// Crawler wiring
// ---------------------------------------------------------------------------

pub(crate) fn test_crawler(
    registry: Arc<FakeRegistry>,
    base_url: &str,
) -> Crawler<FakeFactory, MemStore> {
    let store = MemStore::new();
    let detail = DetailFetcher::new(
        store.clone(),
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
        Duration::from_secs(5),
        3,
        Duration::ZERO,
    )
    .expect("detail fetcher for tests");
    let settings = CrawlSettings {
        base_url: base_url.to_owned(),
        ui_wait: Duration::from_millis(100),
        retry_max_attempts: 3,
        retry_delay: Duration::ZERO,
        scroll_settle: Duration::ZERO,
    };
    Crawler::new(FakeFactory::new(registry), store, detail, settings)
}
