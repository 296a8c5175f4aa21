use std::cmp::Ordering;

use chrono::NaiveDate;

use crate::cluster::cluster_records;
use crate::profile::OverlayProfile;
use crate::record::GeoRecord;
use crate::render::{Color, Marker};
use crate::zoom::{DisplayMode, ZoomLevel, display_mode_for_zoom, grid_size_for_zoom};

pub const CLUSTER_COLOR: Color = Color::BLUE;
const INDIVIDUAL_PIXEL_SIZE: f64 = 10.0;

/// What a refresh should put on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayPlan {
    pub mode: DisplayMode,
    pub markers: Vec<Marker>,
}

/// Builds the marker set for `records` at `zoom`.
///
/// At or above the profile threshold every distinct location gets one
/// marker; records that share exact coordinates are folded into it, soonest
/// upcoming first. Below the threshold records are clustered on the zoom's
/// grid.
pub fn plan_display<'a, I>(
    records: I,
    zoom: ZoomLevel,
    profile: &OverlayProfile,
    today: NaiveDate,
) -> DisplayPlan
where
    I: IntoIterator<Item = &'a GeoRecord>,
{
    let mode = display_mode_for_zoom(zoom, profile.display_threshold);
    let markers = match mode {
        DisplayMode::Individual => individual_markers(records, profile, today),
        DisplayMode::Clustered => cluster_records(records, grid_size_for_zoom(zoom))
            .into_iter()
            .map(|cluster| Marker {
                id: Some(format!("cluster-{}", cluster.region_key)),
                latitude: cluster.center_lat,
                longitude: cluster.center_lon,
                color: CLUSTER_COLOR,
                label: Some(cluster.label(profile.noun)),
                description: None,
                pixel_size: cluster.pixel_size(),
            })
            .collect(),
    };
    DisplayPlan { mode, markers }
}

fn individual_markers<'a, I>(records: I, profile: &OverlayProfile, today: NaiveDate) -> Vec<Marker>
where
    I: IntoIterator<Item = &'a GeoRecord>,
{
    let mut valid: Vec<&GeoRecord> = records
        .into_iter()
        .filter(|r| r.has_valid_coordinates())
        .collect();
    valid.sort_by(|a, b| {
        a.latitude
            .total_cmp(&b.latitude)
            .then(a.longitude.total_cmp(&b.longitude))
            .then_with(|| by_nearest_date(a, b, today))
    });

    valid
        .chunk_by(|a, b| a.latitude == b.latitude && a.longitude == b.longitude)
        .map(|group| {
            let head = group[0];
            let label = match group.len() {
                1 => head.display_name.clone(),
                n => format!("{} +{} more", head.display_name, n - 1),
            };
            Marker {
                id: Some(format!("{}-{}", profile.marker_prefix, head.id)),
                latitude: head.latitude,
                longitude: head.longitude,
                color: profile.marker_color,
                label: Some(label),
                description: describe(group),
                pixel_size: INDIVIDUAL_PIXEL_SIZE,
            }
        })
        .collect()
}

/// Upcoming dates ascending, then past dates most recent first, then undated;
/// name and id settle the rest.
fn by_nearest_date(a: &GeoRecord, b: &GeoRecord, today: NaiveDate) -> Ordering {
    fn rank(date: Option<NaiveDate>, today: NaiveDate) -> (u8, i64) {
        match date {
            Some(d) if d >= today => (0, (d - today).num_days()),
            Some(d) => (1, (today - d).num_days()),
            None => (2, 0),
        }
    }
    rank(a.starts_on, today)
        .cmp(&rank(b.starts_on, today))
        .then_with(|| a.display_name.cmp(&b.display_name))
        .then_with(|| a.id.cmp(&b.id))
}

fn describe(group: &[&GeoRecord]) -> Option<String> {
    if let [only] = group {
        if only.starts_on.is_none() && only.description.is_none() {
            return None;
        }
    }
    let lines: Vec<String> = group
        .iter()
        .map(|r| match (r.starts_on, r.description.as_deref()) {
            (Some(d), Some(text)) => format!("{} ({d}): {text}", r.display_name),
            (Some(d), None) => format!("{} ({d})", r.display_name),
            (None, Some(text)) => format!("{}: {text}", r.display_name),
            (None, None) => r.display_name.clone(),
        })
        .collect();
    Some(lines.join("\n"))
}
