//! Geographic admissibility filtering.
//!
//! Directory sites routinely attach listings from neighboring prefectures to a
//! city page, so a coarse bounding-box test is not enough: points are checked
//! against named subdivision boxes, known false-positive exclusion zones, and
//! protected core zones that must never be excluded.

mod shanghai;

use serde::{Deserialize, Serialize};

/// Axis-aligned lat/lng rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lng_min: f64,
    pub lng_max: f64,
}

impl BoundingBox {
    pub const fn new(lat_min: f64, lat_max: f64, lng_min: f64, lng_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lng_min,
            lng_max,
        }
    }

    pub fn contains(&self, lat: f64, lng: f64) -> bool {
        self.lat_min <= lat && lat <= self.lat_max && self.lng_min <= lng && lng <= self.lng_max
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.lat_min + self.lat_max) / 2.0,
            (self.lng_min + self.lng_max) / 2.0,
        )
    }
}

/// A named rectangle: one administrative subdivision or one exclusion zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamedZone {
    pub name: String,
    #[serde(flatten)]
    pub bounds: BoundingBox,
}

impl NamedZone {
    pub fn new(name: &str, bounds: BoundingBox) -> Self {
        Self {
            name: name.to_string(),
            bounds,
        }
    }
}

/// The complete geographic configuration for one target macro-region.
///
/// Defaults to the Shanghai tables; every field can be overridden from the
/// config file for other geographies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionTables {
    /// Coarse macro-region rectangle. Anything outside is inadmissible.
    pub macro_bounds: BoundingBox,
    /// Named subdivision boxes, checked in listed order (first match wins).
    pub subdivisions: Vec<NamedZone>,
    /// Neighboring regions the directory frequently mislabels into the target.
    pub exclusion_zones: Vec<NamedZone>,
    /// Zones that are definitely inside the target; membership bypasses the
    /// exclusion checks entirely so aggressive exclusion rectangles cannot
    /// discard valid central points.
    pub core_zones: Vec<BoundingBox>,
    /// Maximum centroid distance (in degrees) for the nearest-subdivision
    /// fallback when a point sits in no subdivision box.
    pub centroid_max_distance_deg: f64,
    /// Region label for points inside the macro box but in no subdivision.
    pub boundary_label: String,
}

impl Default for RegionTables {
    fn default() -> Self {
        shanghai::tables()
    }
}

/// Outcome of classifying one coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub admissible: bool,
    /// Subdivision name, boundary sentinel, or the matched exclusion zone
    /// name when inadmissible inside the macro box.
    pub region: String,
}

impl Classification {
    fn rejected(region: &str) -> Self {
        Self {
            admissible: false,
            region: region.to_string(),
        }
    }
}

/// Pure, idempotent point classifier over a fixed set of tables.
#[derive(Debug, Clone, Default)]
pub struct RegionClassifier {
    tables: RegionTables,
}

impl RegionClassifier {
    pub fn new(tables: RegionTables) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &RegionTables {
        &self.tables
    }

    /// Classify a coordinate into a subdivision, the boundary sentinel, or
    /// reject it as out-of-region.
    ///
    /// Check order: macro box, core-override zones, exclusion zones,
    /// subdivision boxes, nearest centroid, boundary fallback. Core zones are
    /// evaluated before exclusion zones on purpose — an exclusion rectangle
    /// that overlaps the target's center must not win there.
    pub fn classify(&self, lat: f64, lng: f64) -> Classification {
        if !self.tables.macro_bounds.contains(lat, lng) {
            return Classification::rejected("");
        }

        let subdivision = self.subdivision_for(lat, lng);

        if self
            .tables
            .core_zones
            .iter()
            .any(|zone| zone.contains(lat, lng))
        {
            return Classification {
                admissible: true,
                region: subdivision.unwrap_or_else(|| self.tables.boundary_label.clone()),
            };
        }

        if let Some(zone) = self
            .tables
            .exclusion_zones
            .iter()
            .find(|zone| zone.bounds.contains(lat, lng))
        {
            return Classification::rejected(&zone.name);
        }

        Classification {
            admissible: true,
            region: subdivision.unwrap_or_else(|| self.tables.boundary_label.clone()),
        }
    }

    /// First subdivision box containing the point (table order breaks
    /// overlaps), else the nearest centroid within the distance threshold.
    /// The table-order tie-break is arbitrary but deterministic.
    fn subdivision_for(&self, lat: f64, lng: f64) -> Option<String> {
        if let Some(zone) = self
            .tables
            .subdivisions
            .iter()
            .find(|zone| zone.bounds.contains(lat, lng))
        {
            return Some(zone.name.clone());
        }

        let mut best: Option<(&NamedZone, f64)> = None;
        for zone in &self.tables.subdivisions {
            let (center_lat, center_lng) = zone.bounds.center();
            let distance = ((lat - center_lat).powi(2) + (lng - center_lng).powi(2)).sqrt();
            // Strict less-than keeps the earlier-listed zone on exact ties.
            if distance <= self.tables.centroid_max_distance_deg
                && best.map(|(_, d)| distance < d).unwrap_or(true)
            {
                best = Some((zone, distance));
            }
        }
        best.map(|(zone, _)| zone.name.clone())
    }
}
