//! Default geographic tables: Shanghai and its sixteen districts.
//!
//! District rectangles are deliberately coarse — directory coordinates carry
//! enough jitter that polygon-accurate boundaries would buy nothing. The
//! exclusion zones cover the neighboring prefectures whose listings the
//! directory most often mislabels as Shanghai.

use super::{BoundingBox, NamedZone, RegionTables};

pub(super) fn tables() -> RegionTables {
    RegionTables {
        // Southern tip of Jinshan to the northern edge of Chongming.
        macro_bounds: BoundingBox::new(30.67, 31.88, 120.85, 122.12),
        subdivisions: vec![
            NamedZone::new("Huangpu", BoundingBox::new(31.22, 31.24, 121.47, 121.51)),
            NamedZone::new("Xuhui", BoundingBox::new(31.17, 31.22, 121.42, 121.47)),
            NamedZone::new("Changning", BoundingBox::new(31.20, 31.24, 121.40, 121.45)),
            NamedZone::new("Jing'an", BoundingBox::new(31.22, 31.26, 121.44, 121.47)),
            NamedZone::new("Putuo", BoundingBox::new(31.23, 31.28, 121.39, 121.45)),
            NamedZone::new("Hongkou", BoundingBox::new(31.26, 31.29, 121.48, 121.53)),
            NamedZone::new("Yangpu", BoundingBox::new(31.26, 31.32, 121.50, 121.56)),
            NamedZone::new("Minhang", BoundingBox::new(31.05, 31.20, 121.32, 121.47)),
            NamedZone::new("Baoshan", BoundingBox::new(31.29, 31.51, 121.44, 121.53)),
            NamedZone::new("Jiading", BoundingBox::new(31.35, 31.42, 121.20, 121.32)),
            NamedZone::new("Pudong", BoundingBox::new(30.85, 31.35, 121.50, 121.95)),
            NamedZone::new("Jinshan", BoundingBox::new(30.72, 30.92, 121.20, 121.47)),
            NamedZone::new("Songjiang", BoundingBox::new(30.98, 31.15, 121.20, 121.40)),
            NamedZone::new("Qingpu", BoundingBox::new(31.10, 31.25, 121.05, 121.25)),
            NamedZone::new("Fengxian", BoundingBox::new(30.78, 30.98, 121.35, 121.65)),
            NamedZone::new("Chongming", BoundingBox::new(31.40, 31.85, 121.30, 121.95)),
        ],
        exclusion_zones: vec![
            NamedZone::new("Suzhou", BoundingBox::new(31.6, 32.0, 120.5, 121.0)),
            NamedZone::new("Kunshan", BoundingBox::new(31.4, 31.7, 120.8, 121.2)),
            NamedZone::new("Jiaxing", BoundingBox::new(30.6, 31.0, 120.5, 121.0)),
            NamedZone::new("Haining", BoundingBox::new(30.4, 30.8, 120.3, 120.9)),
        ],
        core_zones: vec![
            // Central districts (Huangpu through Yangpu).
            BoundingBox::new(31.15, 31.35, 121.35, 121.55),
            BoundingBox::new(31.08, 31.40, 121.50, 121.93),
            BoundingBox::new(31.05, 31.20, 121.25, 121.50),
            BoundingBox::new(31.30, 31.55, 121.35, 121.60),
        ],
        centroid_max_distance_deg: 0.15,
        boundary_label: "boundary".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subdivision_sits_inside_the_macro_box() {
        let tables = tables();
        for zone in &tables.subdivisions {
            let (lat, lng) = zone.bounds.center();
            assert!(
                tables.macro_bounds.contains(lat, lng),
                "{} centroid escapes the macro box",
                zone.name
            );
        }
    }

    #[test]
    fn boxes_are_well_formed() {
        let tables = tables();
        let all = tables
            .subdivisions
            .iter()
            .chain(tables.exclusion_zones.iter());
        for zone in all {
            assert!(zone.bounds.lat_min < zone.bounds.lat_max, "{}", zone.name);
            assert!(zone.bounds.lng_min < zone.bounds.lng_max, "{}", zone.name);
        }
    }
}
