//! Last-resort recognizer: adjacent decimal pairs in plain text.
//!
//! Only consulted when the structured and DOM families found nothing. The
//! pattern is permissive enough to match prices and version strings, so the
//! geographic sanity envelope is mandatory here, not advisory.

use std::sync::OnceLock;

use regex::Regex;

use super::{RawHit, Recognizer};

fn pair_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(-?\d{1,2}\.\d{3,8})\s*,\s*(-?\d{1,3}\.\d{3,8})")
            .expect("valid numeric pair pattern")
    })
}

pub struct TextualRecognizer;

impl TextualRecognizer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextualRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for TextualRecognizer {
    fn name(&self) -> &'static str {
        "textual"
    }

    fn attempt(&self, payload: &str) -> Vec<RawHit> {
        let mut hits = Vec::new();
        for captures in pair_pattern().captures_iter(payload) {
            let (Some(lat_match), Some(lng_match)) = (captures.get(1), captures.get(2)) else {
                continue;
            };
            let (Ok(latitude), Ok(longitude)) = (
                lat_match.as_str().parse::<f64>(),
                lng_match.as_str().parse::<f64>(),
            ) else {
                continue;
            };
            if latitude.abs() > 90.0 || longitude.abs() > 180.0 {
                continue;
            }
            hits.push(RawHit {
                latitude,
                longitude,
                name: None,
            });
        }
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_pair_is_matched() {
        let hits = TextualRecognizer::new().attempt("marker at 31.2304, 121.4737 near the river");
        assert_eq!(hits.len(), 1);
        assert!((hits[0].latitude - 31.2304).abs() < 1e-9);
        assert_eq!(hits[0].name, None);
    }

    #[test]
    fn envelope_violations_are_rejected() {
        let recognizer = TextualRecognizer::new();
        assert!(recognizer.attempt("95.1234, 121.4737").is_empty());
        assert!(recognizer.attempt("31.1234, 196.4737").is_empty());
    }

    #[test]
    fn short_decimals_do_not_match() {
        // Prices and versions: fewer than three decimal digits.
        let hits = TextualRecognizer::new().attempt("v31.2, 121.4 costs 19.99, 29.99");
        assert!(hits.is_empty());
    }
}
