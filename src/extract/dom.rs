//! Recognizer for coordinate-bearing DOM attributes.
//!
//! The directory's rendered markup attaches coordinates to marker/list
//! elements under a handful of attribute naming conventions. The label is
//! taken from a name-like attribute when present, else from the element's
//! own text.

use scraper::{Html, Selector};

use super::{RawHit, Recognizer};

/// Attribute pairs checked in order; one element can only contribute through
/// the first convention it satisfies.
const ATTRIBUTE_PAIRS: &[(&str, &str)] = &[
    ("data-lat", "data-lng"),
    ("data-latitude", "data-longitude"),
    ("lat", "lng"),
];

const NAME_ATTRIBUTES: &[&str] = &["data-name", "data-title", "title", "aria-label"];

pub struct DomRecognizer;

impl DomRecognizer {
    pub fn new() -> Self {
        Self
    }

    fn element_name(element: &scraper::ElementRef<'_>) -> Option<String> {
        for attr in NAME_ATTRIBUTES {
            if let Some(value) = element.value().attr(attr) {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
        let text: String = element.text().collect::<String>().trim().to_string();
        if !text.is_empty() && text.chars().count() <= 160 {
            return Some(text);
        }
        None
    }
}

impl Default for DomRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Recognizer for DomRecognizer {
    fn name(&self) -> &'static str {
        "dom"
    }

    fn attempt(&self, payload: &str) -> Vec<RawHit> {
        let document = Html::parse_document(payload);
        let mut hits = Vec::new();
        let mut claimed = std::collections::HashSet::new();

        for (lat_attr, lng_attr) in ATTRIBUTE_PAIRS {
            let Ok(selector) = Selector::parse(&format!("[{}][{}]", lat_attr, lng_attr)) else {
                continue;
            };
            for element in document.select(&selector) {
                if !claimed.insert(element.id()) {
                    continue;
                }
                let (Some(lat_raw), Some(lng_raw)) = (
                    element.value().attr(lat_attr),
                    element.value().attr(lng_attr),
                ) else {
                    continue;
                };
                let (Ok(latitude), Ok(longitude)) =
                    (lat_raw.trim().parse::<f64>(), lng_raw.trim().parse::<f64>())
                else {
                    continue;
                };
                if latitude.abs() > 90.0 || longitude.abs() > 180.0 {
                    continue;
                }
                hits.push(RawHit {
                    latitude,
                    longitude,
                    name: Self::element_name(&element),
                });
            }
        }

        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_attribute_conventions_are_recognized() {
        let recognizer = DomRecognizer::new();
        let payload = r#"
            <div data-lat="31.2304" data-lng="121.4737"></div>
            <span data-latitude="31.2989" data-longitude="121.5015"></span>
            <marker lat="31.1993" lng="121.5951"></marker>
        "#;
        let hits = recognizer.attempt(payload);
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn name_prefers_attribute_over_element_text() {
        let recognizer = DomRecognizer::new();
        let payload = r#"
            <div data-lat="31.2304" data-lng="121.4737" title="East IDC">ignored text</div>
            <div data-lat="31.2989" data-lng="121.5015">Harbor Data Center</div>
        "#;
        let hits = recognizer.attempt(payload);
        assert_eq!(hits[0].name.as_deref(), Some("East IDC"));
        assert_eq!(hits[1].name.as_deref(), Some("Harbor Data Center"));
    }

    #[test]
    fn unparseable_attributes_are_skipped() {
        let recognizer = DomRecognizer::new();
        let payload = r#"
            <div data-lat="north" data-lng="east"></div>
            <div data-lat="131.0" data-lng="121.0"></div>
            <div data-lat="31.2304" data-lng="121.4737"></div>
        "#;
        let hits = recognizer.attempt(payload);
        assert_eq!(hits.len(), 1);
    }
}
