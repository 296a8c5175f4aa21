//! Cluster Engine: buckets records into fixed-size lat/lon grid cells.

use std::collections::BTreeMap;

use crate::record::GeoRecord;

/// Records that share one grid cell.
///
/// Rebuilt from scratch on every display refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub region_key: String,
    pub center_lat: f64,
    pub center_lon: f64,
    pub count: usize,
    pub members: Vec<GeoRecord>,
}

impl Cluster {
    /// "12 events"
    pub fn label(&self, noun: &str) -> String {
        format!("{} {noun}", self.count)
    }

    /// Marker size in pixels; grows with membership and saturates at 30.
    pub fn pixel_size(&self) -> f64 {
        (10.0 + 0.5 * self.count as f64).min(30.0)
    }
}

/// Groups `records` into cells of `grid_size_deg` degrees.
///
/// The cell origin is `floor(coord / grid) * grid` and the reported center is
/// the origin plus half a cell, not the members' centroid. Records without
/// usable coordinates are skipped. A non-positive or non-finite grid yields
/// no clusters.
pub fn cluster_records<'a, I>(records: I, grid_size_deg: f64) -> Vec<Cluster>
where
    I: IntoIterator<Item = &'a GeoRecord>,
{
    if !grid_size_deg.is_finite() || grid_size_deg <= 0.0 {
        return Vec::new();
    }

    let mut cells: BTreeMap<(i64, i64), Vec<GeoRecord>> = BTreeMap::new();
    for record in records {
        if !record.has_valid_coordinates() {
            continue;
        }
        let row = (record.latitude / grid_size_deg).floor() as i64;
        let col = (record.longitude / grid_size_deg).floor() as i64;
        cells.entry((row, col)).or_default().push(record.clone());
    }

    cells
        .into_iter()
        .map(|((row, col), members)| {
            let origin_lat = row as f64 * grid_size_deg;
            let origin_lon = col as f64 * grid_size_deg;
            Cluster {
                region_key: format!("{origin_lat}_{origin_lon}"),
                center_lat: origin_lat + grid_size_deg / 2.0,
                center_lon: origin_lon + grid_size_deg / 2.0,
                count: members.len(),
                members,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::cluster_records;
    use crate::record::GeoRecord;

    fn rec(id: &str, lat: f64, lon: f64) -> GeoRecord {
        GeoRecord::new(id, id, lat, lon)
    }

    #[test]
    fn cell_center_is_origin_plus_half_grid() {
        let records = vec![rec("a", 49.1, -123.9), rec("b", 49.9, -123.1)];
        let clusters = cluster_records(&records, 1.0);

        assert_eq!(clusters.len(), 1);
        let c = &clusters[0];
        assert_eq!(c.count, 2);
        assert_eq!((c.center_lat, c.center_lon), (49.5, -123.5));
        assert_eq!(c.region_key, "49_-124");
        assert_eq!(c.label("events"), "2 events");
    }

    #[test]
    fn counts_sum_to_valid_inputs() {
        let records = vec![
            rec("a", 10.2, 10.2),
            rec("b", 10.7, 10.9),
            rec("c", -33.8, 151.2),
            rec("d", f64::NAN, 3.0),
            rec("e", 0.0, 200.0),
            rec("f", 51.5, -0.1),
        ];
        for grid in [10.0, 5.0, 2.0, 1.0, 0.5] {
            let total: usize = cluster_records(&records, grid).iter().map(|c| c.count).sum();
            assert_eq!(total, 4, "grid {grid}");
        }
    }

    #[test]
    fn finer_grid_never_merges_more() {
        let records: Vec<GeoRecord> = (0..40)
            .map(|i| rec(&i.to_string(), 40.0 + i as f64 * 0.13, -70.0 - i as f64 * 0.07))
            .collect();
        let coarse = cluster_records(&records, 5.0).len();
        let fine = cluster_records(&records, 0.5).len();
        assert!(fine >= coarse);
    }

    #[test]
    fn degenerate_grid_yields_nothing() {
        let records = vec![rec("a", 1.0, 1.0)];
        assert!(cluster_records(&records, 0.0).is_empty());
        assert!(cluster_records(&records, f64::NAN).is_empty());
    }

    #[test]
    fn pixel_size_saturates() {
        let records: Vec<GeoRecord> = (0..100).map(|i| rec(&i.to_string(), 1.0, 1.0)).collect();
        let clusters = cluster_records(&records[..4], 1.0);
        assert_eq!(clusters[0].pixel_size(), 12.0);
        let clusters = cluster_records(&records, 1.0);
        assert_eq!(clusters[0].pixel_size(), 30.0);
    }
}
