//! Cluster-centroid decomposition.
//!
//! At low zoom the map collapses many facilities into one aggregate marker
//! ("N items" at a single coordinate). A count above 1 is a signal that
//! finer-grained data exists: follow-up queries are issued centered on the
//! cluster coordinate over a schedule of increasing zoom levels (shrinking
//! bounds), until follow-ups stop producing unseen coordinates or the retry
//! budget is spent. The zoom schedule is configuration — the directory's map
//! API is undocumented and the right granularity is an empirical matter.

use std::collections::{HashSet, VecDeque};

use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::core::types::{coordinate_key, ClusterMarker, CoordinateKey};
use crate::extract;
use crate::net;

use super::{FetchOutcome, PageRetriever};

/// Bounds for a follow-up query: half a degree around the marker at zoom 10,
/// halving with each zoom step.
pub(crate) fn bounds_for(marker: &ClusterMarker, zoom: u32) -> (f64, f64, f64, f64) {
    let zoom_factor = 1.0 / 2f64.powi(zoom as i32 - 10);
    let lat_delta = 0.5 * zoom_factor;
    let lng_delta = 0.5 * zoom_factor;
    (
        marker.latitude - lat_delta,
        marker.longitude - lng_delta,
        marker.latitude + lat_delta,
        marker.longitude + lng_delta,
    )
}

pub struct ClusterRetriever {
    client: Client,
    base: Url,
    referer: String,
    schedule: Vec<u32>,
    retry_budget: u32,
    precision: u32,
    markers: VecDeque<ClusterMarker>,
    seen_keys: HashSet<CoordinateKey>,
    extractor: extract::PatternExtractor,
}

impl ClusterRetriever {
    pub fn new(
        client: Client,
        base: Url,
        schedule: Vec<u32>,
        retry_budget: u32,
        precision: u32,
    ) -> Self {
        let referer = base.to_string();
        Self {
            client,
            base,
            referer,
            schedule,
            retry_budget,
            precision,
            markers: VecDeque::new(),
            seen_keys: HashSet::new(),
            extractor: extract::PatternExtractor::new(),
        }
    }

    fn query_url(&self, marker: &ClusterMarker, zoom: u32) -> Url {
        let (south, west, north, east) = bounds_for(marker, zoom);
        let mut url = self.base.clone();
        url.query_pairs_mut()
            .append_pair("lat", &format!("{:.6}", marker.latitude))
            .append_pair("lng", &format!("{:.6}", marker.longitude))
            .append_pair("zoom", &zoom.to_string())
            .append_pair(
                "bounds",
                &format!("{:.6},{:.6},{:.6},{:.6}", south, west, north, east),
            );
        url
    }

    /// Count coordinate keys in `payload` not seen by this mechanism yet,
    /// and remember them.
    fn register_new_keys(&mut self, payload: &str) -> usize {
        let mut fresh = 0;
        for span in self.extractor.extract(payload, "cluster:probe") {
            let key = coordinate_key(span.latitude, span.longitude, self.precision);
            if self.seen_keys.insert(key) {
                fresh += 1;
            }
        }
        fresh
    }

    /// Walk the zoom schedule for one marker, concatenating every payload
    /// that contributed unseen coordinates.
    async fn decompose(&mut self, marker: ClusterMarker) -> Result<String, String> {
        let mut combined = String::new();
        let mut failures = 0u32;

        for zoom in self.schedule.clone() {
            let url = self.query_url(&marker, zoom);
            let (status, body) =
                match net::get_with_retry(&self.client, url.as_str(), &self.referer).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        failures += 1;
                        debug!("cluster: zoom {} failed: {}", zoom, e);
                        if failures >= self.retry_budget {
                            return Err(e.to_string());
                        }
                        continue;
                    }
                };
            if status >= 400 {
                failures += 1;
                if failures >= self.retry_budget {
                    return Err(format!("cluster probes kept failing (last status {})", status));
                }
                continue;
            }

            let fresh = self.register_new_keys(&body);
            debug!(
                "cluster: ({:.4}, {:.4}) zoom {} -> {} unseen coordinates",
                marker.latitude, marker.longitude, zoom, fresh
            );
            if fresh == 0 {
                // Finer zoom is not revealing anything new; stop early.
                break;
            }
            combined.push_str(&body);
            combined.push('\n');
        }

        Ok(combined)
    }
}

#[async_trait::async_trait]
impl PageRetriever for ClusterRetriever {
    fn mechanism(&self) -> &'static str {
        "cluster"
    }

    fn prime(&mut self, payload: &str) {
        self.markers = extract::extract_clusters(payload).into();
        if !self.markers.is_empty() {
            info!(
                "cluster: {} aggregate markers queued for decomposition",
                self.markers.len()
            );
        }
    }

    async fn fetch(&mut self, _page_index: u32) -> FetchOutcome {
        // Page indices do not map onto clusters; each call decomposes the
        // next pending marker until one yields content or none remain.
        while let Some(marker) = self.markers.pop_front() {
            match self.decompose(marker).await {
                Ok(combined) if !combined.trim().is_empty() => {
                    return FetchOutcome::Page(combined);
                }
                Ok(_) => continue,
                Err(e) => return FetchOutcome::Transient(e),
            }
        }
        FetchOutcome::NoPage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(lat: f64, lng: f64, count: u32) -> ClusterMarker {
        ClusterMarker {
            latitude: lat,
            longitude: lng,
            count,
        }
    }

    #[test]
    fn bounds_halve_with_each_zoom_step() {
        let m = marker(31.247448, 121.522076, 86);
        let (s10, w10, n10, e10) = bounds_for(&m, 10);
        let (s11, _, n11, _) = bounds_for(&m, 11);

        assert!((n10 - s10 - 1.0).abs() < 1e-9);
        assert!((e10 - w10 - 1.0).abs() < 1e-9);
        assert!((n11 - s11 - 0.5).abs() < 1e-9);
    }

    #[test]
    fn coarser_than_base_zoom_widens_bounds() {
        let m = marker(31.0, 121.0, 5);
        let (south, _, north, _) = bounds_for(&m, 8);
        assert!((north - south - 4.0).abs() < 1e-9);
    }

    #[test]
    fn bounds_are_centered_on_the_marker() {
        let m = marker(31.2, 121.5, 3);
        let (south, west, north, east) = bounds_for(&m, 12);
        assert!(((south + north) / 2.0 - 31.2).abs() < 1e-9);
        assert!(((west + east) / 2.0 - 121.5).abs() < 1e-9);
    }
}
