//! CDP-backed production implementation of the driver traits.
//!
//! One shared headless Chromium is launched lazily; each [`ChromeSession`]
//! is a tab in it. The registry renders everything client-side, so plain
//! HTTP fetches of listing pages return an empty shell and a real browser
//! is required for the crawl itself.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, HandleJavaScriptDialogParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::driver::{Element, Session, SessionFactory};
use crate::error::HarvestError;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

fn classify(err: CdpError, context: &str) -> HarvestError {
    if matches!(err, CdpError::NotFound) {
        return HarvestError::ElementNotFound(context.to_owned());
    }
    let msg = err.to_string();
    let lower = msg.to_lowercase();
    if lower.contains("node with given id does not belong to the document")
        || lower.contains("could not find node")
        || lower.contains("cannot find context")
        || lower.contains("no node with given id")
    {
        HarvestError::StaleReference(context.to_owned())
    } else {
        HarvestError::Driver(msg)
    }
}

/// Lazily launches and shares one Chromium process across all sessions.
#[derive(Clone)]
pub struct ChromeSessionFactory {
    browser: Arc<Mutex<Option<Arc<Browser>>>>,
    headless: bool,
    user_agent: String,
}

impl ChromeSessionFactory {
    #[must_use]
    pub fn new(headless: bool, user_agent: &str) -> Self {
        Self {
            browser: Arc::new(Mutex::new(None)),
            headless,
            user_agent: user_agent.to_owned(),
        }
    }

    async fn browser(&self) -> Result<Arc<Browser>, HarvestError> {
        let mut guard = self.browser.lock().await;
        if let Some(browser) = guard.as_ref() {
            return Ok(Arc::clone(browser));
        }

        let mut builder = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg(format!("--user-agent={}", self.user_agent));
        if !self.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(HarvestError::Driver)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| HarvestError::Driver(format!("browser launch failed: {e}")))?;
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        let shared = Arc::new(browser);
        *guard = Some(Arc::clone(&shared));
        Ok(shared)
    }

    /// Closes the shared browser if this factory holds the last handle.
    pub async fn shutdown(&self) {
        let mut guard = self.browser.lock().await;
        if let Some(browser) = guard.take() {
            if let Ok(mut browser) = Arc::try_unwrap(browser) {
                if let Err(e) = browser.close().await {
                    warn!(error = %e, "browser close error");
                }
            }
        }
    }
}

impl SessionFactory for ChromeSessionFactory {
    type Sess = ChromeSession;

    async fn create(&self) -> Result<ChromeSession, HarvestError> {
        let browser = self.browser().await?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| HarvestError::Driver(format!("failed to open page: {e}")))?;
        Ok(ChromeSession { page })
    }
}

/// One Chromium tab.
pub struct ChromeSession {
    page: Page,
}

impl ChromeSession {
    /// Polls a boolean javascript probe until it holds or `timeout` passes.
    async fn wait_probe(
        &self,
        probe: &str,
        what: &str,
        timeout: Duration,
    ) -> Result<(), HarvestError> {
        let started = Instant::now();
        loop {
            let holds = self
                .page
                .evaluate(probe)
                .await
                .map_err(|e| classify(e, what))?
                .into_value::<bool>()
                .unwrap_or(false);
            if holds {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(HarvestError::Timeout {
                    what: what.to_owned(),
                    waited_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

impl Session for ChromeSession {
    type Elem = ChromeElement;

    async fn goto(&self, url: &str) -> Result<(), HarvestError> {
        self.page.goto(url).await.map_err(|e| classify(e, url))?;
        self.page
            .wait_for_navigation()
            .await
            .map_err(|e| classify(e, url))?;
        Ok(())
    }

    async fn find(&self, selector: &str) -> Result<ChromeElement, HarvestError> {
        let inner = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| classify(e, selector))?;
        Ok(ChromeElement {
            inner,
            context: selector.to_owned(),
        })
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<ChromeElement>, HarvestError> {
        let elements = match self.page.find_elements(selector).await {
            Ok(elements) => elements,
            // No match is an empty list, not a failure.
            Err(CdpError::NotFound) => Vec::new(),
            Err(e) => return Err(classify(e, selector)),
        };
        Ok(elements
            .into_iter()
            .map(|inner| ChromeElement {
                inner,
                context: selector.to_owned(),
            })
            .collect())
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<(), HarvestError> {
        let probe = format!(
            "(() => {{ const el = document.querySelector({selector:?}); \
             return el !== null && el.offsetParent !== null; }})()"
        );
        self.wait_probe(&probe, selector, timeout).await
    }

    async fn wait_invisible(&self, selector: &str, timeout: Duration) -> Result<(), HarvestError> {
        let probe = format!(
            "(() => {{ const el = document.querySelector({selector:?}); \
             return el === null || el.offsetParent === null; }})()"
        );
        self.wait_probe(&probe, selector, timeout).await
    }

    async fn wait_value_contains(
        &self,
        selector: &str,
        needle: &str,
        timeout: Duration,
    ) -> Result<(), HarvestError> {
        let probe = format!(
            "(() => {{ const el = document.querySelector({selector:?}); \
             return el !== null && (el.value || '').includes({needle:?}); }})()"
        );
        self.wait_probe(&probe, &format!("{selector} value"), timeout)
            .await
    }

    async fn scroll_height(&self) -> Result<i64, HarvestError> {
        self.page
            .evaluate("document.body.scrollHeight")
            .await
            .map_err(|e| classify(e, "scrollHeight"))?
            .into_value::<i64>()
            .map_err(|e| HarvestError::Driver(format!("scrollHeight not a number: {e}")))
    }

    async fn scroll_to_bottom(&self) -> Result<(), HarvestError> {
        self.page
            .evaluate("window.scrollTo(0, document.body.scrollHeight)")
            .await
            .map_err(|e| classify(e, "scrollTo"))?;
        Ok(())
    }

    async fn dismiss_alert(&self) -> Result<bool, HarvestError> {
        match self
            .page
            .execute(HandleJavaScriptDialogParams::new(true))
            .await
        {
            Ok(_) => Ok(true),
            // No dialog open.
            Err(e) => {
                debug!(error = %e, "no dialog to dismiss");
                Ok(false)
            }
        }
    }

    async fn close(&self) {
        if let Err(e) = self.page.clone().close().await {
            debug!(error = %e, "page close error (tab leak)");
        }
    }
}

pub struct ChromeElement {
    inner: chromiumoxide::Element,
    context: String,
}

impl Element for ChromeElement {
    async fn text(&self) -> Result<String, HarvestError> {
        let text = self
            .inner
            .inner_text()
            .await
            .map_err(|e| classify(e, &self.context))?;
        Ok(text.unwrap_or_default())
    }

    async fn inner_html(&self) -> Result<String, HarvestError> {
        let html = self
            .inner
            .inner_html()
            .await
            .map_err(|e| classify(e, &self.context))?;
        Ok(html.unwrap_or_default())
    }

    async fn click(&self) -> Result<(), HarvestError> {
        self.inner
            .click()
            .await
            .map_err(|e| classify(e, &self.context))?;
        Ok(())
    }

    async fn js_click(&self) -> Result<(), HarvestError> {
        self.inner
            .call_js_fn("function() { this.click(); }", false)
            .await
            .map_err(|e| classify(e, &self.context))?;
        Ok(())
    }

    async fn scroll_into_view(&self) -> Result<(), HarvestError> {
        self.inner
            .scroll_into_view()
            .await
            .map_err(|e| classify(e, &self.context))?;
        Ok(())
    }

    async fn screenshot_png(&self) -> Result<Vec<u8>, HarvestError> {
        self.inner
            .screenshot(CaptureScreenshotFormat::Png)
            .await
            .map_err(|e| classify(e, &self.context))
    }
}
