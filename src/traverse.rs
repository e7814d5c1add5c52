//! Pagination traversal control.
//!
//! Drives the retrieval mechanisms in priority order, feeds every payload
//! through extraction → classification → reconciliation, and decides when the
//! run is over: discovered page count reached, every mechanism out of pages,
//! pagination visibly not advancing, or the user asked to stop. Whatever has
//! been reconciled by that point is always finalized — partial results are
//! the product, not a failure mode.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::sync::OnceLock;

use futures::stream::{self, StreamExt};
use regex::Regex;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{native_browser_available, BrowserSession};
use crate::core::config::HarvestConfig;
use crate::core::error::EngineError;
use crate::core::types::{CanonicalRecord, ValidatedRecord};
use crate::extract::PatternExtractor;
use crate::geo::RegionClassifier;
use crate::net;
use crate::reconcile::Reconciler;
use crate::retrieve::{
    ClusterRetriever, EndpointRetriever, FetchOutcome, InteractiveRetriever, PageRetriever,
    ParametricRetriever,
};

/// Cooperative stop flag, checked between pages. Wire it to Ctrl-C in the
/// binary; everything reconciled before the stop is still finalized.
#[derive(Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a traversal stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The discovered (or fallback) page count was reached.
    Completed,
    /// Every mechanism reported NoPage for the same page index.
    Exhausted,
    /// A fetched page contributed no unseen coordinate keys — pagination is
    /// returning the same (or empty) content and is not actually advancing.
    Repeating,
    Cancelled,
}

#[derive(Debug)]
pub struct TraversalReport {
    pub records: Vec<CanonicalRecord>,
    pub pages_fetched: u32,
    /// Pages successfully served per mechanism.
    pub mechanism_pages: BTreeMap<&'static str, u32>,
    pub termination: Termination,
}

// ---------------------------------------------------------------------------
// Page-count discovery
// ---------------------------------------------------------------------------

fn page_count_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#"(?i)total_?pages["']?\s*:\s*(\d+)"#,
            r#"(?i)page_?count["']?\s*:\s*(\d+)"#,
            r"共\s*(\d+)\s*页",
            r"(?i)page\s+\d+\s+of\s+(\d+)",
            r"第\s*\d+\s*页\s*/\s*(\d+)",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid page count patterns"))
        .collect()
    })
}

fn item_count_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r#"(?i)"total_?(?:count|items|results)"\s*:\s*(\d+)"#,
            r#"(?i)"total"\s*:\s*(\d+)"#,
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid item count patterns"))
        .collect()
    })
}

/// Probe a payload for an explicit total-page or total-item count.
///
/// Page counts win over item counts; an item count is divided by `page_size`
/// (rounded up). Implausible values are ignored rather than trusted.
pub fn discover_total_pages(payload: &str, page_size: u32) -> Option<u32> {
    const MAX_PLAUSIBLE_PAGES: u32 = 500;

    for pattern in page_count_patterns() {
        if let Some(value) = pattern
            .captures(payload)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        {
            if (1..=MAX_PLAUSIBLE_PAGES).contains(&value) {
                return Some(value);
            }
        }
    }

    for pattern in item_count_patterns() {
        if let Some(items) = pattern
            .captures(payload)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
        {
            let pages = items.div_ceil(page_size.max(1));
            if (1..=MAX_PLAUSIBLE_PAGES).contains(&pages) {
                return Some(pages);
            }
        }
    }

    None
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

pub struct TraversalController {
    extractor: PatternExtractor,
    classifier: RegionClassifier,
    reconciler: Reconciler,
    retrievers: Vec<Box<dyn PageRetriever>>,
    fallback_page_count: u32,
    page_count_override: Option<u32>,
    page_size: u32,
    cancel: CancelHandle,
    label: String,
}

impl TraversalController {
    pub fn new(
        classifier: RegionClassifier,
        precision: u32,
        retrievers: Vec<Box<dyn PageRetriever>>,
    ) -> Self {
        Self {
            extractor: PatternExtractor::new(),
            classifier,
            reconciler: Reconciler::new(precision),
            retrievers,
            fallback_page_count: 2,
            page_count_override: None,
            page_size: 20,
            cancel: CancelHandle::new(),
            label: "target".to_string(),
        }
    }

    pub fn with_fallback_page_count(mut self, pages: u32) -> Self {
        self.fallback_page_count = pages.max(1);
        self
    }

    /// Caller-supplied page count; skips discovery entirely.
    pub fn with_page_count_override(mut self, pages: u32) -> Self {
        self.page_count_override = Some(pages.max(1));
        self
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_label(mut self, label: &str) -> Self {
        self.label = label.to_string();
        self
    }

    /// Run the full traversal. `initial_payload` is the plain GET of the
    /// target page, used for mechanism priming and page-count discovery; when
    /// absent the traversal starts cold at page 1.
    pub async fn run(mut self, initial_payload: Option<String>) -> TraversalReport {
        let mut mechanism_pages: BTreeMap<&'static str, u32> = BTreeMap::new();
        let mut pages_fetched = 0u32;
        let mut total = self
            .page_count_override
            .unwrap_or(self.fallback_page_count);
        let mut next_page = 1u32;

        if let Some(payload) = initial_payload {
            for retriever in &mut self.retrievers {
                retriever.prime(&payload);
            }
            if self.page_count_override.is_none() {
                match discover_total_pages(&payload, self.page_size) {
                    Some(found) => {
                        info!("{}: discovered {} result pages", self.label, found);
                        total = found;
                    }
                    None => {
                        info!(
                            "{}: no explicit page count; assuming {} pages",
                            self.label, self.fallback_page_count
                        );
                    }
                }
            }
            let (kept, fresh) = self.ingest(&payload, "initial:page1");
            debug!("{}: initial payload kept {} ({} new)", self.label, kept, fresh);
            *mechanism_pages.entry("initial").or_insert(0) += 1;
            pages_fetched = 1;
            next_page = 2;
        }

        let termination = loop {
            if next_page > total {
                break Termination::Completed;
            }
            if self.cancel.is_cancelled() {
                info!("{}: cancelled between pages, finalizing partial results", self.label);
                break Termination::Cancelled;
            }

            let Some((mechanism, payload)) = self.fetch_page(next_page).await else {
                info!(
                    "{}: no mechanism can produce page {}, stopping early",
                    self.label, next_page
                );
                break Termination::Exhausted;
            };
            pages_fetched += 1;
            *mechanism_pages.entry(mechanism).or_insert(0) += 1;

            let source = format!("{}:page{}", mechanism, next_page);
            let (kept, fresh) = self.ingest(&payload, &source);
            debug!(
                "{}: page {} via {} kept {} ({} new)",
                self.label, next_page, mechanism, kept, fresh
            );

            if fresh == 0 {
                info!(
                    "{}: page {} added nothing unseen, pagination is not advancing",
                    self.label, next_page
                );
                break Termination::Repeating;
            }

            next_page += 1;
        };

        info!(
            "✅ {}: traversal done ({:?}), {} facilities across {} pages",
            self.label,
            termination,
            self.reconciler.len(),
            pages_fetched
        );

        TraversalReport {
            records: self.reconciler.finalize(),
            pages_fetched,
            mechanism_pages,
            termination,
        }
    }

    /// Try the mechanisms in priority order until one produces a payload.
    async fn fetch_page(&mut self, page_index: u32) -> Option<(&'static str, String)> {
        for retriever in &mut self.retrievers {
            match retriever.fetch(page_index).await {
                FetchOutcome::Page(payload) => {
                    return Some((retriever.mechanism(), payload));
                }
                FetchOutcome::NoPage => continue,
                FetchOutcome::Transient(reason) => {
                    warn!(
                        "{}: {} transient failure on page {}: {}",
                        self.label,
                        retriever.mechanism(),
                        page_index,
                        reason
                    );
                    continue;
                }
            }
        }
        None
    }

    /// Extract → classify → reconcile one payload. Returns the number of
    /// admissible records and how many carried unseen coordinate keys.
    fn ingest(&mut self, payload: &str, source: &str) -> (usize, usize) {
        let mut kept = 0usize;
        let mut fresh = 0usize;

        for candidate in self.extractor.extract(payload, source) {
            let classification = self
                .classifier
                .classify(candidate.latitude, candidate.longitude);
            if !classification.admissible {
                continue;
            }
            kept += 1;
            let key = self
                .reconciler
                .key_of(candidate.latitude, candidate.longitude);
            if !self.reconciler.is_known(key) {
                fresh += 1;
            }
            self.reconciler.add(ValidatedRecord {
                candidate,
                region: classification.region,
                admissible: true,
            });
        }

        (kept, fresh)
    }
}

// ---------------------------------------------------------------------------
// Target assembly & parallel harvest
// ---------------------------------------------------------------------------

/// One independent harvesting unit: its own URL, its own retrieval session,
/// no pagination state shared with any other target.
#[derive(Debug, Clone)]
pub struct HarvestTarget {
    pub url: String,
    pub label: String,
}

/// How hard to try to get a live rendering session for a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BrowserPolicy {
    /// Simulated interaction switched off.
    Disabled,
    /// Use a browser when one launches; degrade with a warning otherwise.
    Optional,
    /// A launch failure is fatal before any page is fetched.
    Required,
}

pub struct TargetOutcome {
    pub label: String,
    pub report: TraversalReport,
}

/// Build the mechanism stack and run one target end to end.
pub async fn run_target(
    target: &HarvestTarget,
    cfg: &HarvestConfig,
    cancel: CancelHandle,
    policy: BrowserPolicy,
    page_count_override: Option<u32>,
) -> anyhow::Result<TargetOutcome> {
    let base = Url::parse(&target.url).map_err(|e| EngineError::InvalidTarget {
        url: target.url.clone(),
        reason: e.to_string(),
    })?;
    let client = net::build_client(cfg.resolve_request_timeout())?;
    let precision = cfg.resolve_precision();
    let page_size = cfg.resolve_page_size();

    info!("{}: fetching initial payload from {}", target.label, base);
    let initial = match net::get_with_retry(&client, base.as_str(), base.as_str()).await {
        Ok((status, body)) if status < 400 && body.trim().len() >= 32 => Some(body),
        Ok((status, _)) => {
            warn!("{}: initial fetch gave status {}, starting cold", target.label, status);
            None
        }
        Err(e) => {
            warn!("{}: initial fetch failed ({}), starting cold", target.label, e);
            None
        }
    };

    let mut retrievers: Vec<Box<dyn PageRetriever>> = vec![
        Box::new(ParametricRetriever::new(
            client.clone(),
            base.clone(),
            page_size,
        )),
        Box::new(EndpointRetriever::new(client.clone(), base.clone())),
    ];

    if policy != BrowserPolicy::Disabled {
        match BrowserSession::launch(base.as_str()).await {
            Ok(session) => {
                retrievers.push(Box::new(InteractiveRetriever::new(
                    session,
                    cfg.resolve_settle_quiet_ms(),
                    cfg.resolve_settle_timeout_ms(),
                )));
            }
            Err(e) if policy == BrowserPolicy::Required => return Err(e.into()),
            Err(e) => {
                warn!("{}: browser unavailable ({}), skipping interaction", target.label, e);
            }
        }
    }

    retrievers.push(Box::new(ClusterRetriever::new(
        client,
        base,
        cfg.resolve_cluster_zoom_schedule(),
        cfg.resolve_retry_budget(),
        precision,
    )));

    let mut controller = TraversalController::new(
        RegionClassifier::new(cfg.region.clone()),
        precision,
        retrievers,
    )
    .with_fallback_page_count(cfg.resolve_fallback_page_count())
    .with_page_size(page_size)
    .with_cancel(cancel)
    .with_label(&target.label);
    if let Some(pages) = page_count_override {
        controller = controller.with_page_count_override(pages);
    }

    let report = controller.run(initial).await;
    Ok(TargetOutcome {
        label: target.label.clone(),
        report,
    })
}

/// Harvest several independent targets on a bounded worker pool and merge
/// the per-target canonical sets into one.
///
/// Safe to parallelize because each worker owns its retrieval session and
/// appends into a shared collection that is only reconciled after all
/// workers complete; no ordering across workers is guaranteed or needed.
pub async fn harvest_targets(
    targets: Vec<HarvestTarget>,
    cfg: &HarvestConfig,
    cancel: CancelHandle,
    with_browser: bool,
    page_count_override: Option<u32>,
) -> (Vec<CanonicalRecord>, Vec<TargetOutcome>) {
    let policy = if with_browser && native_browser_available() {
        BrowserPolicy::Optional
    } else {
        BrowserPolicy::Disabled
    };

    let outcomes: Arc<Mutex<Vec<TargetOutcome>>> = Arc::new(Mutex::new(Vec::new()));

    stream::iter(targets)
        .map(|target| {
            let cfg = cfg.clone();
            let cancel = cancel.clone();
            let outcomes = Arc::clone(&outcomes);
            async move {
                match run_target(&target, &cfg, cancel, policy, page_count_override).await {
                    Ok(outcome) => {
                        if let Ok(mut sink) = outcomes.lock() {
                            sink.push(outcome);
                        }
                    }
                    Err(e) => warn!("{}: target failed: {}", target.label, e),
                }
            }
        })
        .buffer_unordered(cfg.resolve_max_concurrent_targets())
        .collect::<Vec<()>>()
        .await;

    let outcomes = match Arc::try_unwrap(outcomes) {
        Ok(mutex) => mutex.into_inner().unwrap_or_default(),
        Err(_) => Vec::new(),
    };

    let mut master = Reconciler::new(cfg.resolve_precision());
    for outcome in &outcomes {
        for record in &outcome.report.records {
            master.absorb(record);
        }
    }

    (master.finalize(), outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Deterministic retriever: one scripted outcome per page index.
    struct ScriptedRetriever {
        tag: &'static str,
        pages: Vec<Option<String>>,
    }

    impl ScriptedRetriever {
        fn new(tag: &'static str, pages: Vec<Option<&str>>) -> Self {
            Self {
                tag,
                pages: pages
                    .into_iter()
                    .map(|p| p.map(|s| s.to_string()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl PageRetriever for ScriptedRetriever {
        fn mechanism(&self) -> &'static str {
            self.tag
        }

        async fn fetch(&mut self, page_index: u32) -> FetchOutcome {
            match self.pages.get(page_index as usize - 1) {
                Some(Some(payload)) => FetchOutcome::Page(payload.clone()),
                _ => FetchOutcome::NoPage,
            }
        }
    }

    /// A mechanism that always fails transiently.
    struct FlakyRetriever;

    #[async_trait]
    impl PageRetriever for FlakyRetriever {
        fn mechanism(&self) -> &'static str {
            "flaky"
        }

        async fn fetch(&mut self, _page_index: u32) -> FetchOutcome {
            FetchOutcome::Transient("connection reset".to_string())
        }
    }

    fn payload(lat: f64, lng: f64) -> String {
        format!(r#"{{"latitude": {}, "longitude": {}}}"#, lat, lng)
    }

    fn controller(retrievers: Vec<Box<dyn PageRetriever>>) -> TraversalController {
        TraversalController::new(RegionClassifier::default(), 4, retrievers)
    }

    #[tokio::test]
    async fn stops_when_no_mechanism_can_advance() {
        let scripted = ScriptedRetriever::new(
            "scripted",
            vec![
                Some(&payload(31.2304, 121.4737)),
                Some(&payload(31.2989, 121.5015)),
                None,
            ],
        );
        let report = controller(vec![Box::new(scripted)])
            .with_page_count_override(10)
            .run(None)
            .await;

        assert_eq!(report.termination, Termination::Exhausted);
        assert_eq!(report.pages_fetched, 2);
        assert_eq!(report.records.len(), 2);
    }

    #[tokio::test]
    async fn stops_when_pagination_repeats_content() {
        let same = payload(31.2304, 121.4737);
        let scripted =
            ScriptedRetriever::new("scripted", vec![Some(&same), Some(&same), Some(&same)]);
        let report = controller(vec![Box::new(scripted)])
            .with_page_count_override(10)
            .run(None)
            .await;

        assert_eq!(report.termination, Termination::Repeating);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].duplicate_count, 1);
    }

    #[tokio::test]
    async fn transient_mechanism_falls_through_to_the_next() {
        let scripted = ScriptedRetriever::new(
            "scripted",
            vec![Some(&payload(31.2304, 121.4737))],
        );
        let report = controller(vec![Box::new(FlakyRetriever), Box::new(scripted)])
            .with_page_count_override(1)
            .run(None)
            .await;

        assert_eq!(report.termination, Termination::Completed);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.mechanism_pages.get("scripted"), Some(&1));
        assert!(report.records[0].first_seen_source.starts_with("scripted:"));
    }

    #[tokio::test]
    async fn cancellation_finalizes_partial_results() {
        let scripted = ScriptedRetriever::new(
            "scripted",
            vec![
                Some(&payload(31.2304, 121.4737)),
                Some(&payload(31.2989, 121.5015)),
            ],
        );
        let cancel = CancelHandle::new();
        let initial = payload(31.1993, 121.5951);

        // Cancel before the loop starts: the initial payload must survive.
        cancel.cancel();
        let report = controller(vec![Box::new(scripted)])
            .with_page_count_override(5)
            .with_cancel(cancel)
            .run(Some(initial))
            .await;

        assert_eq!(report.termination, Termination::Cancelled);
        assert_eq!(report.records.len(), 1);
    }

    #[tokio::test]
    async fn discovered_page_count_bounds_the_run() {
        let initial = format!("{} totalPages: 2", payload(31.2304, 121.4737));
        let scripted = ScriptedRetriever::new(
            "scripted",
            vec![
                Some(&payload(31.9, 121.9)), // never requested: page 1 is the initial payload
                Some(&payload(31.2989, 121.5015)),
                Some(&payload(31.1993, 121.5951)),
            ],
        );
        let report = controller(vec![Box::new(scripted)]).run(Some(initial)).await;

        assert_eq!(report.termination, Termination::Completed);
        // Initial payload plus page 2 only.
        assert_eq!(report.pages_fetched, 2);
        assert_eq!(report.records.len(), 2);
    }

    #[test]
    fn page_count_probes_cover_both_languages() {
        assert_eq!(discover_total_pages(r#""totalPages": 7"#, 20), Some(7));
        assert_eq!(discover_total_pages(r#"pageCount: 3"#, 20), Some(3));
        assert_eq!(discover_total_pages("共 5 页", 20), Some(5));
        assert_eq!(discover_total_pages("Page 1 of 12", 20), Some(12));
        assert_eq!(discover_total_pages("第 2 页 / 9", 20), Some(9));
        assert_eq!(discover_total_pages("no pagination here", 20), None);
    }

    #[test]
    fn item_counts_divide_by_page_size() {
        assert_eq!(discover_total_pages(r#""total": 86"#, 20), Some(5));
        assert_eq!(discover_total_pages(r#""totalCount": 40"#, 20), Some(2));
    }
}
