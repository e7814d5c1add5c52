//! URL-parameter pagination.
//!
//! Tries a small fixed set of common parameter conventions until one returns
//! a non-empty payload that differs from the previous page, then sticks with
//! the winner for the rest of the run.

use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::net;

use super::{fingerprint, is_substantial, FetchOutcome, PageRetriever};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Convention {
    /// `?page=N` style: the parameter carries the 1-based page number.
    PageNumber(&'static str),
    /// `?offset=N` style: the parameter carries a record offset.
    Offset(&'static str),
}

impl Convention {
    fn apply(&self, base: &Url, page_index: u32, page_size: u32) -> Url {
        let mut url = base.clone();
        match self {
            Convention::PageNumber(name) => {
                url.query_pairs_mut()
                    .append_pair(name, &page_index.to_string());
            }
            Convention::Offset(name) => {
                let offset = page_index.saturating_sub(1) * page_size;
                url.query_pairs_mut().append_pair(name, &offset.to_string());
            }
        }
        url
    }

    fn label(&self) -> &'static str {
        match self {
            Convention::PageNumber(name) | Convention::Offset(name) => name,
        }
    }
}

const CONVENTIONS: &[Convention] = &[
    Convention::PageNumber("page"),
    Convention::PageNumber("p"),
    Convention::PageNumber("pg"),
    Convention::Offset("offset"),
    Convention::Offset("start"),
];

pub struct ParametricRetriever {
    client: Client,
    base: Url,
    referer: String,
    page_size: u32,
    chosen: Option<Convention>,
    last_fingerprint: Option<u64>,
}

impl ParametricRetriever {
    pub fn new(client: Client, base: Url, page_size: u32) -> Self {
        let referer = base.to_string();
        Self {
            client,
            base,
            referer,
            page_size,
            chosen: None,
            last_fingerprint: None,
        }
    }

    /// Fetch one candidate URL; `Ok(None)` means the response was unusable
    /// (error status or too thin) but the transport worked.
    async fn try_url(&self, url: &Url) -> Result<Option<String>, String> {
        match net::get_with_retry(&self.client, url.as_str(), &self.referer).await {
            Ok((status, body)) if status < 400 && is_substantial(&body) => Ok(Some(body)),
            Ok((status, _)) => {
                debug!("parametric: {} gave status {} or empty body", url, status);
                Ok(None)
            }
            Err(e) => Err(e.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl PageRetriever for ParametricRetriever {
    fn mechanism(&self) -> &'static str {
        "parametric"
    }

    async fn fetch(&mut self, page_index: u32) -> FetchOutcome {
        // Reuse the convention that already worked this run.
        if let Some(convention) = self.chosen {
            let url = convention.apply(&self.base, page_index, self.page_size);
            return match self.try_url(&url).await {
                Ok(Some(body)) => {
                    self.last_fingerprint = Some(fingerprint(&body));
                    FetchOutcome::Page(body)
                }
                Ok(None) => FetchOutcome::NoPage,
                Err(e) => FetchOutcome::Transient(e),
            };
        }

        let mut transient: Option<String> = None;
        for convention in CONVENTIONS {
            let url = convention.apply(&self.base, page_index, self.page_size);
            match self.try_url(&url).await {
                Ok(Some(body)) => {
                    let print = fingerprint(&body);
                    if self.last_fingerprint == Some(print) {
                        debug!(
                            "parametric: ?{} repeats previous content, trying next convention",
                            convention.label()
                        );
                        continue;
                    }
                    info!("parametric: convention ?{} works, keeping it", convention.label());
                    self.chosen = Some(*convention);
                    self.last_fingerprint = Some(print);
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

    fn prime(&mut self, payload: &str) {
        // Remember what page 1 looked like so a convention the server
        // silently ignores (same content back) is not declared the winner.
        self.last_fingerprint = Some(fingerprint(payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_number_conventions_set_the_page_param() {
        let base = Url::parse("https://directory.example/locations/china/shanghai").unwrap();
        let url = Convention::PageNumber("page").apply(&base, 3, 20);
        assert_eq!(url.query(), Some("page=3"));
    }

    #[test]
    fn offset_conventions_scale_by_page_size() {
        let base = Url::parse("https://directory.example/locations?view=list").unwrap();
        let url = Convention::Offset("offset").apply(&base, 3, 20);
        assert_eq!(url.query(), Some("view=list&offset=40"));
    }

    #[test]
    fn first_page_offset_is_zero() {
        let base = Url::parse("https://directory.example/x").unwrap();
        let url = Convention::Offset("start").apply(&base, 1, 25);
        assert_eq!(url.query(), Some("start=0"));
    }
}
