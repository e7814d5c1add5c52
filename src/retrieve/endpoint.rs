//! Background-endpoint pagination.
//!
//! JS-rendered pages usually load their data through secondary calls. The
//! initial payload is scanned for endpoint-like string literals; each
//! candidate is probed with a page parameter. A JSON response is taken as
//! authoritative; anything else non-trivial is handed on as markup.

use std::sync::OnceLock;

use regex::Regex;
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::net;

use super::{is_substantial, FetchOutcome, PageRetriever};

/// Upper bound on endpoint candidates kept from one payload scan.
const MAX_ENDPOINTS: usize = 8;

/// Quoted path literals that smell like data endpoints.
fn endpoint_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"["'](/[A-Za-z0-9_./-]*(?:api|ajax|json|locations|clusters|markers)[A-Za-z0-9_./-]*)["']"#)
            .expect("valid endpoint literal pattern")
    })
}

/// Pull candidate endpoint paths out of a payload, order-preserving.
pub(crate) fn discover_endpoints(payload: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut endpoints = Vec::new();
    for captures in endpoint_pattern().captures_iter(payload) {
        let Some(path) = captures.get(1) else { continue };
        let path = path.as_str();
        // Asset paths match the literal shape but never serve data.
        if path.ends_with(".js") || path.ends_with(".css") || path.ends_with(".png") {
            continue;
        }
        if seen.insert(path.to_string()) {
            endpoints.push(path.to_string());
            if endpoints.len() >= MAX_ENDPOINTS {
                break;
            }
        }
    }
    endpoints
}

pub struct EndpointRetriever {
    client: Client,
    base: Url,
    referer: String,
    endpoints: Vec<Url>,
    working: Option<usize>,
}

impl EndpointRetriever {
    pub fn new(client: Client, base: Url) -> Self {
        let referer = base.to_string();
        Self {
            client,
            base,
            referer,
            endpoints: Vec::new(),
            working: None,
        }
    }

    fn page_url(&self, endpoint: &Url, page_index: u32) -> Url {
        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair("page", &page_index.to_string());
        url
    }

    async fn probe(&self, endpoint: &Url, page_index: u32) -> Result<Option<String>, String> {
        let url = self.page_url(endpoint, page_index);
        match net::get_with_retry(&self.client, url.as_str(), &self.referer).await {
            Ok((status, body)) if status < 400 => {
                if net::looks_like_json(None, &body) {
                    debug!("endpoint: {} answered JSON ({} bytes)", endpoint, body.len());
                    return Ok(Some(body));
                }
                if is_substantial(&body) {
                    debug!("endpoint: {} answered markup ({} bytes)", endpoint, body.len());
                    return Ok(Some(body));
                }
                Ok(None)
            }
            Ok((status, _)) => {
                debug!("endpoint: {} gave status {}", endpoint, status);
                Ok(None)
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl PageRetriever for EndpointRetriever {
    fn mechanism(&self) -> &'static str {
        "endpoint"
    }

    fn prime(&mut self, payload: &str) {
        for path in discover_endpoints(payload) {
            match self.base.join(&path) {
                Ok(url) => self.endpoints.push(url),
                Err(e) => debug!("endpoint: cannot resolve {}: {}", path, e),
            }
        }
        if !self.endpoints.is_empty() {
            info!("endpoint: {} candidate data endpoints discovered", self.endpoints.len());
        }
    }

    async fn fetch(&mut self, page_index: u32) -> FetchOutcome {
        if self.endpoints.is_empty() {
            return FetchOutcome::NoPage;
        }

        if let Some(index) = self.working {
            let endpoint = self.endpoints[index].clone();
            return match self.probe(&endpoint, page_index).await {
                Ok(Some(body)) => FetchOutcome::Page(body),
                Ok(None) => FetchOutcome::NoPage,
                Err(e) => FetchOutcome::Transient(e),
            };
        }

        let mut transient: Option<String> = None;
        for (index, endpoint) in self.endpoints.clone().iter().enumerate() {
            match self.probe(endpoint, page_index).await {
                Ok(Some(body)) => {
                    info!("endpoint: {} works, keeping it", endpoint);
                    self.working = Some(index);
                    return FetchOutcome::Page(body);
                }
                Ok(None) => continue,
                Err(e) => {
                    transient = Some(e);
                    continue;
                }
            }
        }

        match transient {
            Some(e) => FetchOutcome::Transient(e),
            None => FetchOutcome::NoPage,
        }
    }
}
