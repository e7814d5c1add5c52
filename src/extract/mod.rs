//! Multi-format coordinate/name extraction.
//!
//! The directory emits the same facility data in several serialization styles
//! — embedded JSON blobs, script variables, coordinate-bearing DOM attributes
//! — and mixes styles within one payload. Each style gets its own recognizer;
//! all recognizer outputs are concatenated, never short-circuited, because a
//! page can legitimately produce the same pair through two encodings. The
//! reconciler resolves that multiplicity later, not this module.

mod dom;
mod embedded;
mod textual;

use aho_corasick::AhoCorasick;
use std::sync::OnceLock;

use crate::core::types::{CandidateRecord, ClusterMarker};

pub use dom::DomRecognizer;
pub use embedded::EmbeddedRecognizer;
pub use textual::TextualRecognizer;

/// One coordinate pair lifted out of a payload, with an optional label found
/// within a bounded lexical distance of the coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHit {
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
}

/// One self-contained extraction rule targeting one payload encoding
/// convention. Must not fail on malformed input — unparseable fragments are
/// skipped, never fatal.
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &'static str;
    fn attempt(&self, payload: &str) -> Vec<RawHit>;
}

/// Ordered recognizer pipeline.
///
/// The primary families always all run; the textual numeric-pair recognizer
/// is a last resort consulted only when the primaries found nothing, because
/// its false-positive rate is high even with the sanity envelope.
pub struct PatternExtractor {
    primary: Vec<Box<dyn Recognizer>>,
    last_resort: Box<dyn Recognizer>,
}

impl PatternExtractor {
    pub fn new() -> Self {
        Self {
            primary: vec![
                Box::new(EmbeddedRecognizer::new()),
                Box::new(DomRecognizer::new()),
            ],
            last_resort: Box::new(TextualRecognizer::new()),
        }
    }

    /// Scan `payload` with every recognizer family and tag each hit with the
    /// retrieval provenance. Never raises on malformed input.
    pub fn extract(&self, payload: &str, raw_source: &str) -> Vec<CandidateRecord> {
        let mut hits: Vec<RawHit> = Vec::new();
        for recognizer in &self.primary {
            let found = recognizer.attempt(payload);
            if !found.is_empty() {
                tracing::debug!("{}: {} hits", recognizer.name(), found.len());
            }
            hits.extend(found);
        }

        if hits.is_empty() {
            let found = self.last_resort.attempt(payload);
            if !found.is_empty() {
                tracing::debug!("{}: {} hits (fallback)", self.last_resort.name(), found.len());
            }
            hits = found;
        }

        hits.into_iter()
            .map(|hit| CandidateRecord::new(hit.latitude, hit.longitude, hit.name, raw_source))
            .collect()
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Label-value keywords that mark a string as a plausible facility name.
/// Covers the directory's English and Chinese labeling.
pub(crate) fn facility_keywords() -> &'static AhoCorasick {
    static MATCHER: OnceLock<AhoCorasick> = OnceLock::new();
    MATCHER.get_or_init(|| {
        AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build([
                "data center",
                "datacenter",
                "idc",
                "数据中心",
                "机房",
                "shanghai",
                "上海",
            ])
            .expect("valid facility keyword patterns")
    })
}

/// Clamp a byte offset down to the nearest char boundary.
pub(crate) fn floor_boundary(payload: &str, mut index: usize) -> usize {
    if index > payload.len() {
        return payload.len();
    }
    while index > 0 && !payload.is_char_boundary(index) {
        index -= 1;
    }
    index
}

/// Clamp a byte offset up to the nearest char boundary.
pub(crate) fn ceil_boundary(payload: &str, mut index: usize) -> usize {
    if index > payload.len() {
        return payload.len();
    }
    while index < payload.len() && !payload.is_char_boundary(index) {
        index += 1;
    }
    index
}

/// Scan a payload for aggregate map markers: a facility count reported next
/// to a coordinate pair. Count 1 markers are plain facilities, not clusters.
pub fn extract_clusters(payload: &str) -> Vec<ClusterMarker> {
    let mut markers = Vec::new();
    for hit in embedded::pair_spans(payload) {
        if let Some(count) = embedded::count_near(payload, hit.start, hit.end) {
            if count > 1 {
                markers.push(ClusterMarker {
                    latitude: hit.latitude,
                    longitude: hit.longitude,
                    count,
                });
            }
        }
    }
    // Biggest aggregates first: they hide the most facilities.
    markers.sort_by(|a, b| b.count.cmp(&a.count));
    markers
}
