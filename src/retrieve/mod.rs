//! Page retrieval mechanisms.
//!
//! The directory's pagination behavior is undocumented and varies between
//! sessions: sometimes a URL parameter works, sometimes only a background
//! data call, sometimes nothing short of clicking the rendered pager. Each
//! mechanism implements one strategy behind a common interface and reports a
//! typed outcome; the traversal controller owns all retry/advance decisions.
//! No mechanism throws for "no more data" — that is an outcome, not an error.

mod cluster;
mod endpoint;
mod interactive;
mod parametric;

use async_trait::async_trait;

pub use cluster::ClusterRetriever;
pub use endpoint::EndpointRetriever;
pub use interactive::InteractiveRetriever;
pub use parametric::ParametricRetriever;

/// Result of asking one mechanism for one page.
#[derive(Debug)]
pub enum FetchOutcome {
    /// A payload worth extracting from.
    Page(String),
    /// This mechanism cannot produce this page. Not an error — the controller
    /// tries the next mechanism, or terminates when all agree.
    NoPage,
    /// Temporary failure (timeout, connection error, HTTP error status).
    /// Logged and treated as NoPage for this mechanism only.
    Transient(String),
}

impl FetchOutcome {
    pub fn is_page(&self) -> bool {
        matches!(self, FetchOutcome::Page(_))
    }
}

/// One pagination strategy.
#[async_trait]
pub trait PageRetriever: Send {
    /// Short mechanism tag used in provenance strings and the run summary.
    fn mechanism(&self) -> &'static str;

    /// Inspect the initial payload for mechanism-specific signals (endpoint
    /// literals, aggregate markers). Default: nothing to learn.
    fn prime(&mut self, _payload: &str) {}

    /// Produce the payload for `page_index` (1-based), or report why not.
    async fn fetch(&mut self, page_index: u32) -> FetchOutcome;
}

/// Shared notion of "payload too thin to bother extracting".
pub(crate) fn is_substantial(payload: &str) -> bool {
    payload.trim().len() >= 32
}

/// Cheap content fingerprint for repeat detection while probing conventions.
pub(crate) fn fingerprint(payload: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    payload.trim().hash(&mut hasher);
    hasher.finish()
}
