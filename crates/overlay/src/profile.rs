use std::time::Duration;

use crate::render::Color;
use crate::zoom::ZoomLevel;

/// Linear search radius that shrinks as zoom increases:
/// `clamp(min, max, base - per_zoom * zoom)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RadiusRule {
    pub base: f64,
    pub per_zoom: f64,
    pub min: u32,
    pub max: u32,
}

impl RadiusRule {
    pub fn radius_for_zoom(&self, zoom: ZoomLevel) -> u32 {
        let raw = self.base - self.per_zoom * f64::from(zoom);
        raw.round().clamp(f64::from(self.min), f64::from(self.max)) as u32
    }
}

/// Decimal places used when rounding a viewport center into an area key.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PrecisionRule {
    pub coarse: u8,
    pub fine: u8,
    /// Zoom levels strictly above this use `fine`.
    pub fine_above_zoom: ZoomLevel,
}

impl PrecisionRule {
    pub fn uniform(places: u8) -> Self {
        Self {
            coarse: places,
            fine: places,
            fine_above_zoom: 0,
        }
    }

    pub fn precision_for_zoom(&self, zoom: ZoomLevel) -> u8 {
        if zoom > self.fine_above_zoom {
            self.fine
        } else {
            self.coarse
        }
    }
}

/// What happens to the in-memory result set when a fetch succeeds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum ResultPolicy {
    /// Drop everything and keep only the new batch.
    #[default]
    Replace,
    /// Upsert the new batch by record id.
    Merge,
}

/// Tunables for one viewport-driven overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayProfile {
    /// Plural shown in cluster labels ("12 events").
    pub noun: &'static str,
    /// Prefix for individual marker ids.
    pub marker_prefix: &'static str,
    pub marker_color: Color,
    pub radius: RadiusRule,
    pub precision: PrecisionRule,
    /// Zoom at or above which individual markers replace clusters.
    pub display_threshold: ZoomLevel,
    pub cache_ttl: Duration,
    pub cache_max_entries: Option<usize>,
    pub settle: Duration,
    pub result_policy: ResultPolicy,
}

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1024;

impl OverlayProfile {
    /// Ticketed events; radius in kilometers.
    pub fn events() -> Self {
        Self {
            noun: "events",
            marker_prefix: "event",
            marker_color: Color::RED,
            radius: RadiusRule {
                base: 500.0,
                per_zoom: 20.0,
                min: 10,
                max: 500,
            },
            precision: PrecisionRule {
                coarse: 1,
                fine: 2,
                fine_above_zoom: 10,
            },
            display_threshold: 12,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_max_entries: Some(DEFAULT_CACHE_MAX_ENTRIES),
            settle: DEFAULT_SETTLE,
            result_policy: ResultPolicy::Replace,
        }
    }

    /// Businesses and points of interest; radius in meters.
    pub fn places() -> Self {
        Self {
            noun: "places",
            marker_prefix: "place",
            marker_color: Color::YELLOW,
            radius: RadiusRule {
                base: 1500.0,
                per_zoom: 40.0,
                min: 100,
                max: 1000,
            },
            precision: PrecisionRule::uniform(2),
            display_threshold: 15,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_max_entries: Some(DEFAULT_CACHE_MAX_ENTRIES),
            settle: DEFAULT_SETTLE,
            result_policy: ResultPolicy::Replace,
        }
    }

    pub fn radius_for_zoom(&self, zoom: ZoomLevel) -> u32 {
        self.radius.radius_for_zoom(zoom)
    }

    pub fn precision_for_zoom(&self, zoom: ZoomLevel) -> u8 {
        self.precision.precision_for_zoom(zoom)
    }
}
