//! Zoom Mapper: camera height to a coarse 1..=20 zoom level, and zoom level to
//! clustering grid size and display mode.

/// Coarse zoom level, 1 (whole globe) to 20 (street level).
pub type ZoomLevel = u8;

pub const MIN_ZOOM: ZoomLevel = 1;
pub const MAX_ZOOM: ZoomLevel = 20;

/// `(height strictly above, zoom)`; anything at or below the last step is
/// street level.
const HEIGHT_STEPS: [(f64, ZoomLevel); 7] = [
    (10_000_000.0, 1),
    (5_000_000.0, 2),
    (1_000_000.0, 3),
    (500_000.0, 5),
    (100_000.0, 8),
    (50_000.0, 10),
    (10_000.0, 15),
];

/// `(zoom strictly below, grid size in degrees)`.
const GRID_STEPS: [(ZoomLevel, f64); 4] = [(3, 10.0), (5, 5.0), (8, 2.0), (10, 1.0)];
const FINEST_GRID_DEG: f64 = 0.5;

pub fn zoom_level_for_height(height_m: f64) -> ZoomLevel {
    // NaN compares false everywhere and lands on street level; treat it as
    // fully zoomed out instead.
    if height_m.is_nan() {
        return MIN_ZOOM;
    }
    HEIGHT_STEPS
        .iter()
        .find(|(above, _)| height_m > *above)
        .map(|(_, zoom)| *zoom)
        .unwrap_or(MAX_ZOOM)
}

/// Cluster cell edge length. Shrinks as zoom increases.
pub fn grid_size_for_zoom(zoom: ZoomLevel) -> f64 {
    GRID_STEPS
        .iter()
        .find(|(below, _)| zoom < *below)
        .map(|(_, deg)| *deg)
        .unwrap_or(FINEST_GRID_DEG)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DisplayMode {
    /// One marker per distinct location.
    Individual,
    /// One marker per grid cell.
    Clustered,
}

pub fn display_mode_for_zoom(zoom: ZoomLevel, threshold: ZoomLevel) -> DisplayMode {
    if zoom >= threshold {
        DisplayMode::Individual
    } else {
        DisplayMode::Clustered
    }
}

#[cfg(test)]
mod tests {
    use super::{
        DisplayMode, MAX_ZOOM, MIN_ZOOM, display_mode_for_zoom, grid_size_for_zoom,
        zoom_level_for_height,
    };

    #[test]
    fn height_table_steps() {
        assert_eq!(zoom_level_for_height(20_000_000.0), 1);
        assert_eq!(zoom_level_for_height(10_000_000.0), 2);
        assert_eq!(zoom_level_for_height(2_000_000.0), 3);
        assert_eq!(zoom_level_for_height(750_000.0), 5);
        assert_eq!(zoom_level_for_height(200_000.0), 8);
        assert_eq!(zoom_level_for_height(75_000.0), 10);
        assert_eq!(zoom_level_for_height(20_000.0), 15);
        assert_eq!(zoom_level_for_height(10_000.0), 20);
        assert_eq!(zoom_level_for_height(0.0), 20);
        assert_eq!(zoom_level_for_height(f64::NAN), MIN_ZOOM);
    }

    #[test]
    fn zoom_never_decreases_as_camera_descends() {
        let mut prev = MIN_ZOOM;
        let mut h = 40_000_000.0;
        while h > 1.0 {
            let z = zoom_level_for_height(h);
            assert!(z >= prev, "zoom went from {prev} to {z} at height {h}");
            assert!((MIN_ZOOM..=MAX_ZOOM).contains(&z));
            prev = z;
            h *= 0.9;
        }
    }

    #[test]
    fn grid_size_is_non_increasing_in_zoom() {
        let sizes: Vec<f64> = (MIN_ZOOM..=MAX_ZOOM).map(grid_size_for_zoom).collect();
        for pair in sizes.windows(2) {
            assert!(pair[1] <= pair[0], "{sizes:?}");
        }
        assert_eq!(grid_size_for_zoom(1), 10.0);
        assert_eq!(grid_size_for_zoom(4), 5.0);
        assert_eq!(grid_size_for_zoom(7), 2.0);
        assert_eq!(grid_size_for_zoom(9), 1.0);
        assert_eq!(grid_size_for_zoom(20), 0.5);
    }

    #[test]
    fn display_mode_switches_at_threshold() {
        assert_eq!(display_mode_for_zoom(11, 12), DisplayMode::Clustered);
        assert_eq!(display_mode_for_zoom(12, 12), DisplayMode::Individual);
        assert_eq!(display_mode_for_zoom(20, 15), DisplayMode::Individual);
    }
}
