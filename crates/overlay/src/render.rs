//! Boundary to the 3D viewer. The overlays never draw directly; they describe
//! markers and region fills and hand them to a [`Renderer`].

use std::collections::BTreeMap;

use foundation::{CameraPose, ViewportSample, sample_viewport};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Straight RGBA, each channel in `0.0..=1.0`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const fn with_alpha(self, a: f32) -> Self {
        Self {
            r: self.r,
            g: self.g,
            b: self.b,
            a,
        }
    }

    pub const RED: Color = Color::rgb(1.0, 0.0, 0.0);
    pub const GREEN: Color = Color::rgb(0.0, 0.5, 0.0);
    pub const BLUE: Color = Color::rgb(0.0, 0.0, 1.0);
    pub const YELLOW: Color = Color::rgb(1.0, 1.0, 0.0);
    pub const ORANGE: Color = Color::rgb(1.0, 0.647, 0.0);
    pub const GRAY: Color = Color::rgb(0.5, 0.5, 0.5);
    pub const BLACK: Color = Color::rgb(0.0, 0.0, 0.0);
    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);
}

#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub id: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub color: Color,
    pub label: Option<String>,
    pub description: Option<String>,
    pub pixel_size: f64,
}

impl Marker {
    pub fn at(latitude: f64, longitude: f64) -> Self {
        Self {
            id: None,
            latitude,
            longitude,
            color: Color::RED,
            label: None,
            description: None,
            pixel_size: 10.0,
        }
    }
}

/// A country polygon tinted by code (ISO 3166-1 alpha-2).
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFill {
    pub region_code: String,
    pub color: Color,
    pub outline: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(pub u64);

/// Drawing and camera contract offered by the viewer.
///
/// Implementations must be safe to call from any task; all methods are
/// synchronous and cheap.
pub trait Renderer: Send + Sync {
    /// `false` until the viewer can accept layers.
    fn is_ready(&self) -> bool;

    fn create_group(&self, group: &str) -> bool;
    fn remove_group(&self, group: &str);

    fn add_marker(&self, group: &str, marker: Marker);
    fn remove_marker(&self, group: &str, id: &str);
    fn clear_group(&self, group: &str);
    fn set_group_visible(&self, group: &str, visible: bool);

    fn fill_region(&self, group: &str, fill: RegionFill);

    /// Raw camera state, `None` when no view exists.
    fn camera_pose(&self) -> Option<CameraPose>;

    fn viewport_center_and_height(&self) -> Option<ViewportSample> {
        self.camera_pose().as_ref().and_then(sample_viewport)
    }

    /// Every time the camera comes to rest a unit is pushed into `notify`.
    fn on_viewport_settled(&self, notify: mpsc::UnboundedSender<()>) -> ListenerId;
    fn off_viewport_settled(&self, id: ListenerId);
}

#[derive(Debug, Default)]
struct Group {
    visible: bool,
    markers: Vec<Marker>,
    regions: Vec<RegionFill>,
}

#[derive(Debug, Default)]
struct Scene {
    ready: bool,
    camera: Option<CameraPose>,
    groups: BTreeMap<String, Group>,
    listeners: BTreeMap<ListenerId, mpsc::UnboundedSender<()>>,
    next_listener: u64,
}

/// Headless renderer that records what it was asked to draw.
///
/// Backs the headless host and the tests.
#[derive(Debug, Default)]
pub struct MemoryRenderer {
    scene: Mutex<Scene>,
}

impl MemoryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready() -> Self {
        let renderer = Self::default();
        renderer.set_ready(true);
        renderer
    }

    pub fn set_ready(&self, ready: bool) {
        self.scene.lock().ready = ready;
    }

    pub fn set_camera(&self, pose: Option<CameraPose>) {
        self.scene.lock().camera = pose;
    }

    /// Moves the camera and tells every settled-listener about it.
    /// Listeners whose receiver is gone are pruned.
    pub fn move_camera(&self, pose: CameraPose) {
        let mut scene = self.scene.lock();
        scene.camera = Some(pose);
        scene.listeners.retain(|_, tx| tx.send(()).is_ok());
    }

    pub fn markers(&self, group: &str) -> Vec<Marker> {
        self.scene
            .lock()
            .groups
            .get(group)
            .map(|g| g.markers.clone())
            .unwrap_or_default()
    }

    pub fn regions(&self, group: &str) -> Vec<RegionFill> {
        self.scene
            .lock()
            .groups
            .get(group)
            .map(|g| g.regions.clone())
            .unwrap_or_default()
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.scene.lock().groups.contains_key(group)
    }

    pub fn is_visible(&self, group: &str) -> bool {
        self.scene
            .lock()
            .groups
            .get(group)
            .is_some_and(|g| g.visible)
    }

    pub fn listener_count(&self) -> usize {
        self.scene.lock().listeners.len()
    }
}

impl Renderer for MemoryRenderer {
    fn is_ready(&self) -> bool {
        self.scene.lock().ready
    }

    fn create_group(&self, group: &str) -> bool {
        let mut scene = self.scene.lock();
        if !scene.ready {
            return false;
        }
        scene.groups.entry(group.to_string()).or_insert_with(|| Group {
            visible: true,
            ..Group::default()
        });
        true
    }

    fn remove_group(&self, group: &str) {
        self.scene.lock().groups.remove(group);
    }

    fn add_marker(&self, group: &str, marker: Marker) {
        let mut scene = self.scene.lock();
        let Some(g) = scene.groups.get_mut(group) else {
            tracing::warn!(group, "add_marker on unknown group");
            return;
        };
        if let Some(id) = marker.id.as_deref() {
            g.markers.retain(|m| m.id.as_deref() != Some(id));
        }
        g.markers.push(marker);
    }

    fn remove_marker(&self, group: &str, id: &str) {
        if let Some(g) = self.scene.lock().groups.get_mut(group) {
            g.markers.retain(|m| m.id.as_deref() != Some(id));
        }
    }

    fn clear_group(&self, group: &str) {
        if let Some(g) = self.scene.lock().groups.get_mut(group) {
            g.markers.clear();
            g.regions.clear();
        }
    }

    fn set_group_visible(&self, group: &str, visible: bool) {
        if let Some(g) = self.scene.lock().groups.get_mut(group) {
            g.visible = visible;
        }
    }

    fn fill_region(&self, group: &str, fill: RegionFill) {
        let mut scene = self.scene.lock();
        let Some(g) = scene.groups.get_mut(group) else {
            tracing::warn!(group, "fill_region on unknown group");
            return;
        };
        g.regions.retain(|r| r.region_code != fill.region_code);
        g.regions.push(fill);
    }

    fn camera_pose(&self) -> Option<CameraPose> {
        self.scene.lock().camera
    }

    fn on_viewport_settled(&self, notify: mpsc::UnboundedSender<()>) -> ListenerId {
        let mut scene = self.scene.lock();
        scene.next_listener += 1;
        let id = ListenerId(scene.next_listener);
        scene.listeners.insert(id, notify);
        id
    }

    fn off_viewport_settled(&self, id: ListenerId) {
        self.scene.lock().listeners.remove(&id);
    }
}
