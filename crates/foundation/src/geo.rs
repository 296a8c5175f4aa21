//! Geo Sampler: turns whatever the viewer reports about its camera into a
//! plain `{latitude, longitude, height}` sample.

use crate::math::{Ecef, Geodetic, ecef_to_geodetic, geodetic_to_ecef, wrap_longitude};

/// Center of the current view plus the camera's height above the ellipsoid.
///
/// Recomputed on every movement; never persisted.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewportSample {
    pub latitude: f64,
    pub longitude: f64,
    pub height: f64,
}

impl ViewportSample {
    pub fn new(latitude: f64, longitude: f64, height: f64) -> Self {
        Self {
            latitude,
            longitude,
            height,
        }
    }
}

/// Raw camera state in ECEF.
///
/// `center_pick` is where the ray through the middle of the screen hits the
/// ellipsoid; it is `None` when the camera looks past the globe.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraPose {
    pub camera: Ecef,
    pub center_pick: Option<Ecef>,
}

impl CameraPose {
    /// A camera hovering straight above a surface point.
    pub fn looking_down_at(latitude: f64, longitude: f64, height: f64) -> Self {
        Self {
            camera: geodetic_to_ecef(Geodetic::new(latitude, longitude, height)),
            center_pick: Some(geodetic_to_ecef(Geodetic::new(latitude, longitude, 0.0))),
        }
    }

    /// A camera whose view misses the globe entirely.
    pub fn off_globe(camera: Ecef) -> Self {
        Self {
            camera,
            center_pick: None,
        }
    }
}

/// Converts a camera pose into a viewport sample.
///
/// Returns `None` when there is no center pick or any component is not a
/// finite number.
pub fn sample_viewport(pose: &CameraPose) -> Option<ViewportSample> {
    let center = pose.center_pick?;
    if !center.is_finite() || !pose.camera.is_finite() {
        return None;
    }

    let center = ecef_to_geodetic(center);
    let camera = ecef_to_geodetic(pose.camera);

    let sample = ViewportSample {
        latitude: center.lat_deg.clamp(-90.0, 90.0),
        longitude: wrap_longitude(center.lon_deg),
        height: camera.alt_m.max(0.0),
    };
    if sample.latitude.is_finite() && sample.longitude.is_finite() && sample.height.is_finite() {
        Some(sample)
    } else {
        None
    }
}

/// True when `(latitude, longitude)` is a usable position on the globe.
pub fn is_valid_coordinate(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}

#[cfg(test)]
mod tests {
    use super::{CameraPose, is_valid_coordinate, sample_viewport};
    use crate::math::Ecef;

    fn assert_close(a: f64, b: f64, eps: f64) {
        let diff = (a - b).abs();
        assert!(diff <= eps, "expected {a} ~= {b} (diff {diff})");
    }

    #[test]
    fn samples_center_and_height() {
        let pose = CameraPose::looking_down_at(49.28, -123.12, 75_000.0);
        let sample = sample_viewport(&pose).unwrap();
        assert_close(sample.latitude, 49.28, 1e-9);
        assert_close(sample.longitude, -123.12, 1e-9);
        assert_close(sample.height, 75_000.0, 1e-4);
    }

    #[test]
    fn no_center_pick_means_no_sample() {
        let pose = CameraPose::off_globe(Ecef::new(3.0e7, 0.0, 0.0));
        assert!(sample_viewport(&pose).is_none());
    }

    #[test]
    fn non_finite_pose_is_rejected() {
        let mut pose = CameraPose::looking_down_at(0.0, 0.0, 1_000.0);
        pose.camera = Ecef::new(f64::NAN, 0.0, 0.0);
        assert!(sample_viewport(&pose).is_none());
    }

    #[test]
    fn coordinate_validity() {
        assert!(is_valid_coordinate(49.28, -123.12));
        assert!(is_valid_coordinate(-90.0, 180.0));
        assert!(!is_valid_coordinate(91.0, 0.0));
        assert!(!is_valid_coordinate(0.0, -180.5));
        assert!(!is_valid_coordinate(f64::NAN, 0.0));
    }
}
