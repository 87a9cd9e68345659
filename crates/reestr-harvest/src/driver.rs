//! Browser-automation capability consumed by the crawl and backfill code.
//!
//! The crawler only ever talks to these traits. The production
//! implementation drives a headless Chromium over CDP (`crate::chrome`);
//! tests script a fake registry against the same traits.

use std::future::Future;
use std::time::Duration;

use crate::error::HarvestError;

/// A handle to one element in the live document.
///
/// Handles go stale whenever the page re-renders; operations on a stale
/// handle fail with [`HarvestError::StaleReference`] and the caller is
/// expected to re-find the element.
pub trait Element: Send + Sync {
    fn text(&self) -> impl Future<Output = Result<String, HarvestError>> + Send;

    fn inner_html(&self) -> impl Future<Output = Result<String, HarvestError>> + Send;

    fn click(&self) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Click via injected javascript. DevExpress view-switch buttons sit
    /// under a ripple overlay that swallows native clicks.
    fn js_click(&self) -> impl Future<Output = Result<(), HarvestError>> + Send;

    fn scroll_into_view(&self) -> impl Future<Output = Result<(), HarvestError>> + Send;

    fn screenshot_png(&self) -> impl Future<Output = Result<Vec<u8>, HarvestError>> + Send;
}

/// One browser tab navigated to the registry.
pub trait Session: Send + Sync {
    type Elem: Element;

    fn goto(&self, url: &str) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Finds the first element matching `selector`, failing with
    /// [`HarvestError::ElementNotFound`] when absent.
    fn find(
        &self,
        selector: &str,
    ) -> impl Future<Output = Result<Self::Elem, HarvestError>> + Send;

    fn find_all(
        &self,
        selector: &str,
    ) -> impl Future<Output = Result<Vec<Self::Elem>, HarvestError>> + Send;

    /// Waits until `selector` matches a rendered (visible) element.
    fn wait_visible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Waits until `selector` matches nothing visible. Used for the
    /// loading overlays that block interaction between steps.
    fn wait_invisible(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Waits until the form control at `selector` has a value containing
    /// `needle`.
    fn wait_value_contains(
        &self,
        selector: &str,
        needle: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), HarvestError>> + Send;

    fn scroll_height(&self) -> impl Future<Output = Result<i64, HarvestError>> + Send;

    fn scroll_to_bottom(&self) -> impl Future<Output = Result<(), HarvestError>> + Send;

    /// Accepts any open javascript dialog. Returns whether one was open.
    fn dismiss_alert(&self) -> impl Future<Output = Result<bool, HarvestError>> + Send;

    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Creates fresh sessions: one per crawl direction, `pool_size` for the
/// image backfill pool.
pub trait SessionFactory: Send + Sync {
    type Sess: Session + Send + Sync + 'static;

    fn create(&self) -> impl Future<Output = Result<Self::Sess, HarvestError>> + Send;
}
