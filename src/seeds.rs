//! Curated seed records.
//!
//! Well-known facilities collected from public sources can be merged into a
//! run alongside scraped data; they go through the same classification and
//! reconciliation as everything else, so a scrape that rediscovers a seeded
//! facility collapses onto it instead of duplicating it.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::core::types::CandidateRecord;

#[derive(Debug, Deserialize)]
pub struct SeedRecord {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Load a JSON array of seed records and convert them to extraction
/// candidates with `seed` provenance.
pub fn load_seeds(path: &Path) -> Result<Vec<CandidateRecord>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read seed file {}", path.display()))?;
    let seeds: Vec<SeedRecord> = serde_json::from_str(&contents)
        .with_context(|| format!("seed file {} is not a JSON array of records", path.display()))?;

    Ok(seeds
        .into_iter()
        .map(|seed| {
            CandidateRecord::new(seed.latitude, seed.longitude, Some(seed.name), "seed")
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn seed_file_parses_into_candidates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"name": "Telecom Info Park IDC", "latitude": 31.2304, "longitude": 121.4737}}]"#
        )
        .unwrap();

        let seeds = load_seeds(file.path()).unwrap();
        assert_eq!(seeds.len(), 1);
        assert_eq!(seeds[0].raw_source, "seed");
        assert_eq!(seeds[0].name.as_deref(), Some("Telecom Info Park IDC"));
    }

    #[test]
    fn malformed_seed_file_is_an_error_with_context() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        let err = load_seeds(file.path()).unwrap_err();
        assert!(err.to_string().contains("not a JSON array"));
    }
}
