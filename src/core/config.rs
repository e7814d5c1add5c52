use std::path::PathBuf;

use serde::Deserialize;

use crate::geo::RegionTables;

// ---------------------------------------------------------------------------
// HarvestConfig — file-based config loader (facility-scout.json) with
// env-var fallback per field
// ---------------------------------------------------------------------------

pub const ENV_CONFIG_PATH: &str = "FACILITY_SCOUT_CONFIG";
pub const ENV_PRECISION: &str = "FACILITY_SCOUT_PRECISION";
pub const ENV_FALLBACK_PAGES: &str = "FACILITY_SCOUT_FALLBACK_PAGES";
pub const ENV_RETRY_BUDGET: &str = "FACILITY_SCOUT_RETRY_BUDGET";
pub const ENV_TIMEOUT_SECS: &str = "FACILITY_SCOUT_HTTP_TIMEOUT_SECS";
pub const ENV_SETTLE_QUIET_MS: &str = "FACILITY_SCOUT_SETTLE_QUIET_MS";
pub const ENV_SETTLE_TIMEOUT_MS: &str = "FACILITY_SCOUT_SETTLE_TIMEOUT_MS";
pub const ENV_OUTPUT_DIR: &str = "FACILITY_SCOUT_OUTPUT_DIR";

/// Top-level config loaded from `facility-scout.json`.
///
/// Every field is optional in the file; resolution per field is
/// JSON field → env var → built-in default.
#[derive(Deserialize, Default, Clone, Debug)]
pub struct HarvestConfig {
    /// Decimal digits both coordinate axes are rounded to for the merge key.
    /// 4 matches the jitter observed in directory data; 5–6 trade merge
    /// aggressiveness for collision risk.
    pub precision: Option<u32>,
    /// Page count assumed when the site exposes no explicit total. A
    /// deliberate floor, not a guess about site behavior — callers override.
    pub fallback_page_count: Option<u32>,
    /// Follow-up attempts each mechanism may burn on transient failures.
    pub retry_budget: Option<u32>,
    pub request_timeout_secs: Option<u64>,
    /// Rendered-state settle wait: quiet period and hard cap for the
    /// poll-until-stable loop after a simulated interaction.
    pub settle_quiet_ms: Option<u64>,
    pub settle_timeout_ms: Option<u64>,
    /// Zoom levels walked when decomposing an aggregate map marker.
    pub cluster_zoom_schedule: Option<Vec<u32>>,
    /// Items per page assumed by offset-style pagination parameters.
    pub page_size: Option<u32>,
    /// Worker-pool width for independent targets.
    pub max_concurrent_targets: Option<usize>,
    pub output_dir: Option<String>,
    /// Optional JSON file of curated seed records merged into every run.
    pub seed_path: Option<String>,
    /// Geographic tables; defaults to Shanghai.
    #[serde(default)]
    pub region: RegionTables,
}

impl HarvestConfig {
    /// Rounding precision: JSON field → `FACILITY_SCOUT_PRECISION` → 4.
    pub fn resolve_precision(&self) -> u32 {
        self.precision
            .or_else(|| env_parse(ENV_PRECISION))
            .unwrap_or(4)
            .clamp(1, 8)
    }

    /// Fallback page count: JSON field → `FACILITY_SCOUT_FALLBACK_PAGES` → 2.
    pub fn resolve_fallback_page_count(&self) -> u32 {
        self.fallback_page_count
            .or_else(|| env_parse(ENV_FALLBACK_PAGES))
            .unwrap_or(2)
            .max(1)
    }

    /// Per-mechanism retry budget: JSON field → env → 3.
    pub fn resolve_retry_budget(&self) -> u32 {
        self.retry_budget
            .or_else(|| env_parse(ENV_RETRY_BUDGET))
            .unwrap_or(3)
    }

    /// Per-request timeout: JSON field → env → 30 s.
    pub fn resolve_request_timeout(&self) -> std::time::Duration {
        let secs = self
            .request_timeout_secs
            .or_else(|| env_parse(ENV_TIMEOUT_SECS))
            .unwrap_or(30);
        std::time::Duration::from_secs(secs.max(1))
    }

    /// Quiet period the rendered page must hold before it counts as settled.
    pub fn resolve_settle_quiet_ms(&self) -> u64 {
        self.settle_quiet_ms
            .or_else(|| env_parse(ENV_SETTLE_QUIET_MS))
            .unwrap_or(1_500)
    }

    /// Hard cap on any single settle wait.
    pub fn resolve_settle_timeout_ms(&self) -> u64 {
        self.settle_timeout_ms
            .or_else(|| env_parse(ENV_SETTLE_TIMEOUT_MS))
            .unwrap_or(8_000)
    }

    /// Cluster decomposition zoom schedule, coarse to fine.
    pub fn resolve_cluster_zoom_schedule(&self) -> Vec<u32> {
        match &self.cluster_zoom_schedule {
            Some(schedule) if !schedule.is_empty() => schedule.clone(),
            _ => (8..=16).collect(),
        }
    }

    pub fn resolve_page_size(&self) -> u32 {
        self.page_size.unwrap_or(20).max(1)
    }

    pub fn resolve_max_concurrent_targets(&self) -> usize {
        self.max_concurrent_targets.unwrap_or(4).max(1)
    }

    /// Output directory: JSON field → `FACILITY_SCOUT_OUTPUT_DIR` → `data`.
    pub fn resolve_output_dir(&self) -> PathBuf {
        if let Some(dir) = &self.output_dir {
            if !dir.trim().is_empty() {
                return PathBuf::from(dir);
            }
        }
        std::env::var(ENV_OUTPUT_DIR)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("data"))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Load `facility-scout.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `FACILITY_SCOUT_CONFIG` env var path
/// 2. `./facility-scout.json`
/// 3. `../facility-scout.json`
///
/// Missing file → defaults (silent, env-var fallbacks still apply).
/// Parse error → log a warning, return defaults.
pub fn load_config() -> HarvestConfig {
    let mut candidates = vec![
        PathBuf::from("facility-scout.json"),
        PathBuf::from("../facility-scout.json"),
    ];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, PathBuf::from(env_path));
    }

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<HarvestConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("facility-scout.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "facility-scout.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return HarvestConfig::default();
                }
            },
            Err(_) => continue,
        }
    }

    HarvestConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = HarvestConfig::default();
        assert_eq!(cfg.resolve_precision(), 4);
        assert_eq!(cfg.resolve_fallback_page_count(), 2);
        assert_eq!(cfg.resolve_cluster_zoom_schedule(), (8..=16).collect::<Vec<_>>());
        assert!(!cfg.region.subdivisions.is_empty());
    }

    #[test]
    fn partial_json_overrides_keep_region_defaults() {
        let cfg: HarvestConfig =
            serde_json::from_str(r#"{"precision": 5, "fallback_page_count": 7}"#).unwrap();
        assert_eq!(cfg.resolve_precision(), 5);
        assert_eq!(cfg.resolve_fallback_page_count(), 7);
        assert_eq!(cfg.region.boundary_label, "boundary");
    }

    #[test]
    fn region_tables_roundtrip_through_json() {
        let cfg: HarvestConfig = serde_json::from_str(
            r#"{"region": {"boundary_label": "edge", "centroid_max_distance_deg": 0.3}}"#,
        )
        .unwrap();
        assert_eq!(cfg.region.boundary_label, "edge");
        // Unspecified region fields still come from the Shanghai defaults.
        assert_eq!(cfg.region.subdivisions.len(), 16);
    }
}
