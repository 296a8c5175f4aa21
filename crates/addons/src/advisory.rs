//! Travel advisory addon: tints every country by its advisory level.
//!
//! Unlike the point overlays this one does not follow the camera; the feed
//! is fetched once per `initialize`.

use std::sync::Arc;

use overlay::{BoxFuture, Color, RegionFill, Renderer};
use parking_lot::Mutex;

use crate::control::AddonControl;
use crate::lifecycle::Lifecycle;
use crate::providers::{AdvisoryFeed, AdvisorySource};
use crate::record::{ADVISORY_ADDON_ID, AddonOptions};
use crate::state::AddonState;

pub const HOME_COUNTRY: &str = "CA";
const FILL_ALPHA: f32 = 0.5;

/// 0 take normal precautions, 1 high caution, 2 avoid non-essential travel,
/// 3 avoid all travel. Anything else is "no data".
pub fn advisory_color(level: Option<u8>) -> Color {
    let base = match level {
        Some(0) => Color::GREEN,
        Some(1) => Color::YELLOW,
        Some(2) => Color::ORANGE,
        Some(3) => Color::RED,
        _ => Color::GRAY,
    };
    base.with_alpha(FILL_ALPHA)
}

pub fn region_color(country_code: &str, level: Option<u8>) -> Color {
    if country_code == HOME_COUNTRY {
        Color::BLUE.with_alpha(FILL_ALPHA)
    } else {
        advisory_color(level)
    }
}

pub struct AdvisoryAddon {
    lifecycle: Lifecycle,
    renderer: Arc<dyn Renderer>,
    source: Arc<dyn AdvisorySource>,
    group: String,
    url: Mutex<String>,
    feed: Mutex<Option<AdvisoryFeed>>,
}

impl AdvisoryAddon {
    pub fn new(
        renderer: Arc<dyn Renderer>,
        source: Arc<dyn AdvisorySource>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            lifecycle: Lifecycle::new(ADVISORY_ADDON_ID),
            renderer,
            source,
            group: ADVISORY_ADDON_ID.to_string(),
            url: Mutex::new(url.into()),
            feed: Mutex::new(None),
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    async fn load(&self) -> bool {
        if !self.renderer.is_ready() {
            tracing::error!(addon = %self.id(), "cannot initialize, viewer is not available");
            return false;
        }
        let url = self.url.lock().clone();
        let feed = match self.source.fetch(&url).await {
            Ok(feed) => feed,
            Err(err) => {
                tracing::error!(addon = %self.id(), error = %err, "failed to load advisory feed");
                return false;
            }
        };
        if !self.renderer.create_group(&self.group) {
            return false;
        }
        self.renderer.set_group_visible(&self.group, false);
        self.paint(&feed);
        tracing::info!(
            addon = %self.id(),
            countries = feed.data.len(),
            generated = feed.generated_date().unwrap_or("unknown"),
            "advisory feed applied"
        );
        *self.feed.lock() = Some(feed);
        true
    }

    fn paint(&self, feed: &AdvisoryFeed) {
        let mut codes: Vec<&str> = feed.data.keys().map(String::as_str).collect();
        if !feed.data.contains_key(HOME_COUNTRY) {
            codes.push(HOME_COUNTRY);
        }
        for code in codes {
            self.renderer.fill_region(
                &self.group,
                RegionFill {
                    region_code: code.to_string(),
                    color: region_color(code, feed.level(code)),
                    outline: Color::BLACK,
                },
            );
        }
    }
}

impl AddonControl for AdvisoryAddon {
    fn id(&self) -> &str {
        self.lifecycle.addon_id()
    }

    fn state(&self) -> AddonState {
        self.lifecycle.state()
    }

    fn install(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.lifecycle.install() })
    }

    fn initialize(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.lifecycle.initialize(move || self.load()))
    }

    fn start(&self) -> BoxFuture<'_, bool> {
        Box::pin(self.lifecycle.start(move || async move {
            self.renderer.set_group_visible(&self.group, true);
            true
        }))
    }

    fn stop(&self) -> bool {
        self.lifecycle
            .stop(|| self.renderer.set_group_visible(&self.group, false))
    }

    fn destroy(&self) -> bool {
        self.lifecycle.destroy(
            || self.renderer.set_group_visible(&self.group, false),
            || self.renderer.remove_group(&self.group),
        )
    }

    fn uninstall(&self) -> bool {
        self.lifecycle.uninstall(
            || self.renderer.set_group_visible(&self.group, false),
            || self.renderer.remove_group(&self.group),
        )
    }

    fn set_installed_previously(&self) {
        self.lifecycle.set_installed_previously();
    }

    fn set_options(&self, options: &AddonOptions) {
        if let Some(url) = options.http_endpoint() {
            *self.url.lock() = url.to_string();
        }
    }

    fn last_data_update(&self) -> Option<String> {
        let feed = self.feed.lock();
        let date = feed.as_ref().and_then(|f| f.generated_date());
        Some(date.unwrap_or("No data").to_string())
    }
}
