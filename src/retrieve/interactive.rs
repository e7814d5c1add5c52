//! Simulated-interaction pagination.
//!
//! Drives a live rendering session: finds the pager control whose label or
//! data attribute names the target page, activates it, waits for the page to
//! settle, and reads back the rendered state. Markup conventions for pagers
//! vary, so several selector strategies are tried in order, and a failed
//! native click is retried once through an in-page synthetic click before
//! the mechanism gives up on that page.

use tracing::{debug, info, warn};

use crate::browser::BrowserSession;

use super::{is_substantial, FetchOutcome, PageRetriever};

/// Containers whose child elements are candidate page controls when matching
/// by visible label.
const PAGER_CONTAINERS: &[&str] = &[
    ".pagination a",
    ".pagination button",
    ".pager a",
    ".pager button",
    ".page-numbers a",
    "a[class*='page']",
    "button[class*='page']",
];

pub struct InteractiveRetriever {
    session: BrowserSession,
    settle_quiet_ms: u64,
    settle_timeout_ms: u64,
}

impl InteractiveRetriever {
    /// Wrap an already-launched session. Launch failures are the caller's
    /// fatal-error path; from here on everything degrades gracefully.
    pub fn new(session: BrowserSession, settle_quiet_ms: u64, settle_timeout_ms: u64) -> Self {
        Self {
            session,
            settle_quiet_ms,
            settle_timeout_ms,
        }
    }

    pub async fn shutdown(self) {
        self.session.close().await;
    }

    /// Try each selector strategy until one activates a control.
    async fn activate_page_control(&self, page_index: u32) -> anyhow::Result<bool> {
        let label = page_index.to_string();

        // Data-attribute conventions first: cheapest and most specific.
        for selector in [
            format!("a[data-page='{}']", label),
            format!("button[data-page='{}']", label),
            format!("[data-page='{}']", label),
            format!("a[href*='page={}']", label),
        ] {
            match self.session.click_selector(&selector).await {
                Ok(true) => {
                    debug!("interactive: activated {}", selector);
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) => debug!("interactive: {} failed: {}", selector, e),
            }
            // Alternate activation path before moving to the next strategy.
            if self.session.js_click(&selector).await.unwrap_or(false) {
                debug!("interactive: activated {} via synthetic click", selector);
                return Ok(true);
            }
        }

        // Visible-label match inside known pager containers.
        for container in PAGER_CONTAINERS {
            match self.session.click_by_text(container, &label).await {
                Ok(true) => {
                    debug!("interactive: activated '{}' in {}", label, container);
                    return Ok(true);
                }
                Ok(false) => {}
                Err(e) => debug!("interactive: {} text match failed: {}", container, e),
            }
            if self
                .session
                .js_click_by_text(container, &label)
                .await
                .unwrap_or(false)
            {
                debug!(
                    "interactive: activated '{}' in {} via synthetic click",
                    label, container
                );
                return Ok(true);
            }
        }

        Ok(false)
    }
}

#[async_trait::async_trait]
impl PageRetriever for InteractiveRetriever {
    fn mechanism(&self) -> &'static str {
        "interactive"
    }

    async fn fetch(&mut self, page_index: u32) -> FetchOutcome {
        // Page 1 is whatever the session currently renders.
        if page_index <= 1 {
            self.session
                .wait_until_stable(self.settle_quiet_ms, self.settle_timeout_ms)
                .await;
            return match self.session.content().await {
                Ok(html) if is_substantial(&html) => FetchOutcome::Page(html),
                Ok(_) => FetchOutcome::NoPage,
                Err(e) => FetchOutcome::Transient(e.to_string()),
            };
        }

        match self.activate_page_control(page_index).await {
            Ok(true) => {}
            Ok(false) => {
                info!("interactive: no control found for page {}", page_index);
                return FetchOutcome::NoPage;
            }
            Err(e) => {
                warn!("interactive: activation error on page {}: {}", page_index, e);
                return FetchOutcome::Transient(e.to_string());
            }
        }

        self.session
            .wait_until_stable(self.settle_quiet_ms, self.settle_timeout_ms)
            .await;

        match self.session.content().await {
            Ok(html) if is_substantial(&html) => FetchOutcome::Page(html),
            Ok(_) => FetchOutcome::NoPage,
            Err(e) => FetchOutcome::Transient(e.to_string()),
        }
    }
}
