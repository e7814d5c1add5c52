//! Recognizer for coordinates embedded in script/JSON payload text.
//!
//! Matches adjacent latitude/longitude key-value assignments within a bounded
//! character window, in the encodings the directory has been observed to use:
//! quoted JSON keys (`"latitude"`/`"longitude"`, `"lat"`/`"lng"`/`"lon"`),
//! bare script-variable assignments (`lat: x`, `lat = x`), and the packed
//! `position="lat,lng"` attribute form.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use super::{ceil_boundary, facility_keywords, floor_boundary, RawHit, Recognizer};

/// How far apart the two halves of a pair may sit.
const PAIR_WINDOW: usize = 240;
/// How far around a pair a label-like key is searched for.
const NAME_WINDOW: usize = 300;
/// How far past a pair an aggregate count key is searched for.
const COUNT_WINDOW: usize = 120;

#[derive(Debug, Clone, Copy)]
pub(crate) struct PairSpan {
    pub latitude: f64,
    pub longitude: f64,
    pub start: usize,
    pub end: usize,
}

fn pair_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let number = r"(-?\d{1,3}(?:\.\d+)?)";
        [
            // Quoted JSON keys, long or short form.
            format!(
                r#"(?s)"(?:latitude|lat)"\s*:\s*{number}.{{0,{PAIR_WINDOW}}}?"(?:longitude|lng|lon)"\s*:\s*{number}"#
            ),
            // Bare script-variable assignments.
            format!(
                r#"(?s)\b(?:latitude|lat)\s*[:=]\s*{number}.{{0,{PAIR_WINDOW}}}?\b(?:longitude|lng|lon)\s*[:=]\s*{number}"#
            ),
            // Packed marker attribute.
            format!(r#"position\s*=\s*"{number}\s*,\s*{number}""#),
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid coordinate pair patterns"))
        .collect()
    })
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""(?:name|title|label)"\s*:\s*"([^"]{2,160})""#)
            .expect("valid name pattern")
    })
}

fn count_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#""(?:count|cluster_count|facilities_count|size)"\s*:\s*(\d+)"#)
            .expect("valid count pattern")
    })
}

/// All coordinate pairs in the payload, deduplicated by exact value so the
/// overlapping pair patterns do not report one assignment twice.
pub(crate) fn pair_spans(payload: &str) -> Vec<PairSpan> {
    let mut seen: HashSet<(u64, u64)> = HashSet::new();
    let mut spans = Vec::new();

    for pattern in pair_patterns() {
        for captures in pattern.captures_iter(payload) {
            let (Some(whole), Some(lat_match), Some(lng_match)) =
                (captures.get(0), captures.get(1), captures.get(2))
            else {
                continue;
            };
            // A capture that is not numeric drops this candidate only.
            let (Ok(latitude), Ok(longitude)) = (
                lat_match.as_str().parse::<f64>(),
                lng_match.as_str().parse::<f64>(),
            ) else {
                continue;
            };
            if latitude.abs() > 90.0 || longitude.abs() > 180.0 {
                continue;
            }
            if !seen.insert((latitude.to_bits(), longitude.to_bits())) {
                continue;
            }
            spans.push(PairSpan {
                latitude,
                longitude,
                start: whole.start(),
                end: whole.end(),
            });
        }
    }

    spans
}

/// Label-like key near the pair whose value carries a facility or region
/// keyword. The window can overlap neighboring records, so the match closest
/// to the pair wins; keyword-less `"name"` values are ignored outright — the
/// window routinely overlaps unrelated UI strings.
fn name_near(payload: &str, start: usize, end: usize) -> Option<String> {
    let lo = floor_boundary(payload, start.saturating_sub(NAME_WINDOW));
    let hi = ceil_boundary(payload, (end + NAME_WINDOW).min(payload.len()));
    let window = &payload[lo..hi];
    let pair_mid = (start + end) / 2;

    let mut best: Option<(usize, String)> = None;
    for captures in name_pattern().captures_iter(window) {
        let value_match = captures.get(1)?;
        let value = value_match.as_str().trim();
        if !facility_keywords().is_match(value) {
            continue;
        }
        let position = lo + value_match.start();
        let distance = position.abs_diff(pair_mid);
        if best.as_ref().map(|(d, _)| distance < *d).unwrap_or(true) {
            best = Some((distance, value.to_string()));
        }
    }
    best.map(|(_, name)| name)
}

/// Aggregate count reported just after the pair, if any.
pub(crate) fn count_near(payload: &str, _start: usize, end: usize) -> Option<u32> {
    let lo = ceil_boundary(payload, end);
    let hi = ceil_boundary(payload, (end + COUNT_WINDOW).min(payload.len()));
    let window = &payload[lo..hi];

    count_pattern()
        .captures(window)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub struct EmbeddedRecognizer;

impl EmbeddedRecognizer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for EmbeddedRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for EmbeddedRecognizer {
    fn name(&self) -> &'static str {
        "embedded"
    }

    fn attempt(&self, payload: &str) -> Vec<RawHit> {
        pair_spans(payload)
            .into_iter()
            .map(|span| RawHit {
                latitude: span.latitude,
                longitude: span.longitude,
                name: name_near(payload, span.start, span.end),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_long_and_short_forms_both_match() {
        let recognizer = EmbeddedRecognizer::new();
        let hits = recognizer.attempt(
            r#"{"latitude": 31.2304, "longitude": 121.4737} {"lat": 31.2989, "lng": 121.5015}"#,
        );
        assert_eq!(hits.len(), 2);
        assert!((hits[0].latitude - 31.2304).abs() < 1e-9);
        assert!((hits[1].longitude - 121.5015).abs() < 1e-9);
    }

    #[test]
    fn bare_script_assignment_matches() {
        let recognizer = EmbeddedRecognizer::new();
        let hits = recognizer.attempt("var lat = 31.2304; var lng = 121.4737;");
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn packed_position_attribute_matches() {
        let recognizer = EmbeddedRecognizer::new();
        let hits = recognizer.attempt(r#"<marker position="31.2304,121.4737"/>"#);
        assert_eq!(hits.len(), 1);
        assert!((hits[0].longitude - 121.4737).abs() < 1e-9);
    }

    #[test]
    fn name_requires_facility_keyword_within_window() {
        let recognizer = EmbeddedRecognizer::new();

        let keyword = r#"{"name": "Telecom Info Park IDC", "latitude": 31.2304, "longitude": 121.4737}"#;
        assert_eq!(
            recognizer.attempt(keyword)[0].name.as_deref(),
            Some("Telecom Info Park IDC")
        );

        let chinese =
            r#"{"latitude": 31.2304, "longitude": 121.4737, "title": "漕河泾数据中心"}"#;
        assert_eq!(
            recognizer.attempt(chinese)[0].name.as_deref(),
            Some("漕河泾数据中心")
        );

        let unrelated = r#"{"name": "Toolbar", "latitude": 31.2304, "longitude": 121.4737}"#;
        assert_eq!(recognizer.attempt(unrelated)[0].name, None);
    }

    #[test]
    fn adjacent_records_keep_their_own_names() {
        let recognizer = EmbeddedRecognizer::new();
        let payload = r#"
            {"name": "North IDC", "latitude": 31.2304, "longitude": 121.4737}
            {"name": "South IDC", "latitude": 31.1993, "longitude": 121.5951}
        "#;
        let hits = recognizer.attempt(payload);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].name.as_deref(), Some("North IDC"));
        assert_eq!(hits[1].name.as_deref(), Some("South IDC"));
    }

    #[test]
    fn far_apart_halves_do_not_pair() {
        let recognizer = EmbeddedRecognizer::new();
        let padding = "x".repeat(PAIR_WINDOW + 50);
        let payload = format!(r#""latitude": 31.2304 {} "longitude": 121.4737"#, padding);
        assert!(recognizer.attempt(&payload).is_empty());
    }

    #[test]
    fn out_of_envelope_pair_drops_only_that_candidate() {
        let recognizer = EmbeddedRecognizer::new();
        let payload = r#"
            {"latitude": 31.2304, "longitude": 121.4737}
            {"latitude": 999, "longitude": 121.5}
        "#;
        let hits = recognizer.attempt(payload);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn count_is_read_just_past_the_pair() {
        let payload = r#"{"lat": 31.247448, "lng": 121.522076, "count": 86}"#;
        let spans = pair_spans(payload);
        assert_eq!(spans.len(), 1);
        assert_eq!(count_near(payload, spans[0].start, spans[0].end), Some(86));
    }
}
