//! Coordinate-key deduplication and reconciliation.
//!
//! Records for the same physical facility arrive from several retrieval
//! mechanisms with slightly different coordinate strings, so merging happens
//! on coordinates rounded to a fixed precision, not on float equality or
//! names. The reconciler is the single owner of all accumulator state for a
//! run; it is not internally synchronized and must be fed from one writer.

use std::collections::HashMap;

use crate::core::types::{
    coordinate_key, CanonicalRecord, CoordinateKey, ValidatedRecord,
};

pub struct Reconciler {
    precision: u32,
    seen: HashMap<CoordinateKey, usize>,
    records: Vec<CanonicalRecord>,
}

impl Reconciler {
    pub fn new(precision: u32) -> Self {
        Self {
            precision,
            seen: HashMap::new(),
            records: Vec::new(),
        }
    }

    pub fn precision(&self) -> u32 {
        self.precision
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// The merge key this reconciler would assign to a coordinate.
    pub fn key_of(&self, latitude: f64, longitude: f64) -> CoordinateKey {
        coordinate_key(latitude, longitude, self.precision)
    }

    pub fn is_known(&self, key: CoordinateKey) -> bool {
        self.seen.contains_key(&key)
    }

    /// Merge one validated record into the canonical set.
    ///
    /// First sighting of a key creates the canonical record and freezes its
    /// name/region/provenance (first-seen-wins, a documented arbitrary
    /// policy). Later sightings only bump the duplicate counter.
    pub fn add(&mut self, record: ValidatedRecord) {
        if !record.admissible {
            return;
        }

        let key = self.key_of(record.candidate.latitude, record.candidate.longitude);
        if let Some(&index) = self.seen.get(&key) {
            self.records[index].duplicate_count += 1;
            return;
        }

        let sequence_index = self.records.len();
        let name = record
            .candidate
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Facility {}", sequence_index + 1));

        self.seen.insert(key, sequence_index);
        self.records.push(CanonicalRecord {
            coordinate_key: key,
            latitude: record.candidate.latitude,
            longitude: record.candidate.longitude,
            name,
            region: record.region,
            first_seen_source: record.candidate.raw_source,
            sequence_index,
            duplicate_count: 0,
        });
    }

    /// Merge a canonical record produced by another run segment (a parallel
    /// target worker). Keeps first-seen-wins across segments; the sequence
    /// index is reassigned in this reconciler's own order.
    pub fn absorb(&mut self, record: &CanonicalRecord) {
        let key = self.key_of(record.latitude, record.longitude);
        if let Some(&index) = self.seen.get(&key) {
            self.records[index].duplicate_count += 1 + record.duplicate_count;
            return;
        }
        let sequence_index = self.records.len();
        self.seen.insert(key, sequence_index);
        let mut merged = record.clone();
        merged.coordinate_key = key;
        merged.sequence_index = sequence_index;
        self.records.push(merged);
    }

    /// The canonical set in sequence-index order.
    pub fn finalize(self) -> Vec<CanonicalRecord> {
        self.records
    }
}
