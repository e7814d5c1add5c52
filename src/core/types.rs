use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Latitude/longitude rounded to a fixed decimal precision and scaled to
/// integers. Exact and hashable, unlike the raw floats it is derived from.
pub type CoordinateKey = (i64, i64);

/// Round both axes to `precision` decimal digits and scale to integers.
///
/// The same physical facility is reported with slightly different coordinate
/// strings across retrieval mechanisms (different truncation, different source
/// encodings), so exact float equality is the wrong merge key.
pub fn coordinate_key(latitude: f64, longitude: f64, precision: u32) -> CoordinateKey {
    let scale = 10f64.powi(precision as i32);
    (
        (latitude * scale).round() as i64,
        (longitude * scale).round() as i64,
    )
}

/// A coordinate/name hit pulled out of one raw payload.
///
/// Transient: produced by the extractor, consumed immediately by the region
/// classifier. A missing name is filled with a generated placeholder when the
/// record is first reconciled.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateRecord {
    pub latitude: f64,
    pub longitude: f64,
    pub name: Option<String>,
    /// Which retrieval mechanism and page index produced this hit.
    pub raw_source: String,
}

impl CandidateRecord {
    pub fn new(latitude: f64, longitude: f64, name: Option<String>, raw_source: &str) -> Self {
        Self {
            latitude,
            longitude,
            name,
            raw_source: raw_source.to_string(),
        }
    }
}

/// A candidate that has been through the region classifier.
#[derive(Debug, Clone)]
pub struct ValidatedRecord {
    pub candidate: CandidateRecord,
    /// Subdivision name, or the configured boundary/unclassified sentinel.
    pub region: String,
    pub admissible: bool,
}

/// The single retained, deduplicated representation of one physical facility.
///
/// Exactly one exists per coordinate key within a run. `name`, `region` and
/// `first_seen_source` are fixed at insertion (first-seen-wins); later
/// sightings only bump `duplicate_count`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub coordinate_key: CoordinateKey,
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    pub region: String,
    pub first_seen_source: String,
    pub sequence_index: usize,
    pub duplicate_count: usize,
}

/// An aggregate map marker: `count` facilities collapsed onto one coordinate
/// at low zoom. A count above 1 signals that finer-grained data exists and is
/// worth decomposing with narrower follow-up queries.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterMarker {
    pub latitude: f64,
    pub longitude: f64,
    pub count: u32,
}

/// End-of-run rollup: counts per region and per retrieval mechanism, plus the
/// geographic envelope of everything kept.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub total: usize,
    pub duplicates_merged: usize,
    pub per_region: BTreeMap<String, usize>,
    pub per_source: BTreeMap<String, usize>,
    /// (lat_min, lat_max, lng_min, lng_max) over all canonical records.
    pub envelope: Option<(f64, f64, f64, f64)>,
}

impl RunSummary {
    pub fn from_records(records: &[CanonicalRecord]) -> Self {
        let mut summary = RunSummary {
            total: records.len(),
            ..Default::default()
        };

        for record in records {
            *summary.per_region.entry(record.region.clone()).or_insert(0) += 1;
            let mechanism = record
                .first_seen_source
                .split(':')
                .next()
                .unwrap_or(record.first_seen_source.as_str())
                .to_string();
            *summary.per_source.entry(mechanism).or_insert(0) += 1;
            summary.duplicates_merged += record.duplicate_count;

            summary.envelope = Some(match summary.envelope {
                None => (
                    record.latitude,
                    record.latitude,
                    record.longitude,
                    record.longitude,
                ),
                Some((lat_min, lat_max, lng_min, lng_max)) => (
                    lat_min.min(record.latitude),
                    lat_max.max(record.latitude),
                    lng_min.min(record.longitude),
                    lng_max.max(record.longitude),
                ),
            });
        }

        summary
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} facilities ({} duplicate sightings merged)",
            self.total, self.duplicates_merged
        )?;
        for (region, count) in &self.per_region {
            writeln!(f, "  {}: {}", region, count)?;
        }
        for (source, count) in &self.per_source {
            writeln!(f, "  via {}: {}", source, count)?;
        }
        if let Some((lat_min, lat_max, lng_min, lng_max)) = self.envelope {
            writeln!(
                f,
                "  envelope: lat {:.6}..{:.6}, lng {:.6}..{:.6}",
                lat_min, lat_max, lng_min, lng_max
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_rounds_to_configured_precision() {
        assert_eq!(coordinate_key(31.2304, 121.4737, 4), (312304, 1214737));
        assert_eq!(coordinate_key(31.23041, 121.47371, 4), (312304, 1214737));
    }

    #[test]
    fn key_separates_beyond_precision() {
        assert_eq!(
            coordinate_key(31.230450, 121.0, 5),
            coordinate_key(31.230453, 121.0, 5)
        );
        assert_ne!(
            coordinate_key(31.23045, 121.0, 5),
            coordinate_key(31.23150, 121.0, 5)
        );
    }

    #[test]
    fn summary_counts_regions_and_mechanisms() {
        let records = vec![
            CanonicalRecord {
                coordinate_key: (312304, 1214737),
                latitude: 31.2304,
                longitude: 121.4737,
                name: "A".into(),
                region: "Huangpu".into(),
                first_seen_source: "parametric:page1".into(),
                sequence_index: 0,
                duplicate_count: 2,
            },
            CanonicalRecord {
                coordinate_key: (312989, 1215015),
                latitude: 31.2989,
                longitude: 121.5015,
                name: "B".into(),
                region: "Pudong".into(),
                first_seen_source: "interactive:page2".into(),
                sequence_index: 1,
                duplicate_count: 0,
            },
        ];
        let summary = RunSummary::from_records(&records);
        assert_eq!(summary.total, 2);
        assert_eq!(summary.duplicates_merged, 2);
        assert_eq!(summary.per_region.get("Huangpu"), Some(&1));
        assert_eq!(summary.per_source.get("parametric"), Some(&1));
        let (lat_min, lat_max, _, _) = summary.envelope.unwrap();
        assert!(lat_min < lat_max);
    }
}
