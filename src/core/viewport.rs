use crate::animation::position::LiveSample;
use crate::core::config::ViewConfig;
use crate::core::constants::{FLING_FRICTION, TILE_DISPLAY_SIZE};
use crate::core::geo::{self, LatLng, Point};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Source of the map rotation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OrientationMode {
    #[default]
    NorthUp,
    TrackUp,
    HeadingUp,
}

/// Camera parameters of the map: center, integer zoom, orientation and fling.
///
/// Screen space has its origin at the top-left corner with y growing down;
/// planar space is Web Mercator metres with y growing north. A positive
/// rotation turns the map clockwise on screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    center: LatLng,
    zoom: u8,
    min_zoom: u8,
    max_zoom: u8,
    /// Viewport size in pixels
    size: Point,
    tile_px: f64,
    orientation: OrientationMode,
    /// Fling velocity in screen pixels per second
    fling: Option<Point>,
    fling_friction: f64,
    fling_stop_speed: f64,
    live: Option<LiveSample>,
}

impl ViewState {
    /// Builds the view from an unvalidated config: an inverted zoom range is
    /// swapped, and out-of-range friction or tile size fall back to the defaults.
    pub fn new(config: &ViewConfig, size: Point) -> Self {
        let min_zoom = config.min_zoom.min(config.max_zoom);
        let max_zoom = config.min_zoom.max(config.max_zoom);
        let fling_friction = if (0.0..1.0).contains(&config.fling_friction) {
            config.fling_friction
        } else {
            log::warn!(
                "fling friction {} outside [0, 1), using {}",
                config.fling_friction,
                FLING_FRICTION
            );
            FLING_FRICTION
        };
        let tile_px = if config.tile_display_px.is_finite() && config.tile_display_px > 0.0 {
            config.tile_display_px
        } else {
            TILE_DISPLAY_SIZE
        };

        let mut view = Self {
            center: LatLng::default(),
            zoom: config.initial_zoom.clamp(min_zoom, max_zoom),
            min_zoom,
            max_zoom,
            size,
            tile_px,
            orientation: OrientationMode::NorthUp,
            fling: None,
            fling_friction,
            fling_stop_speed: config.fling_stop_speed,
            live: None,
        };
        view.set_center(config.initial_center);
        view
    }

    pub fn center(&self) -> LatLng {
        self.center
    }

    /// Sets the center, clamping latitude and wrapping longitude
    pub fn set_center(&mut self, center: LatLng) {
        self.center = LatLng::new(LatLng::clamp_lat(center.lat), LatLng::wrap_lng(center.lng));
    }

    pub fn zoom_level(&self) -> u8 {
        self.zoom
    }

    /// Sets the zoom level, clamping to the configured range
    pub fn set_zoom_level(&mut self, zoom: u8) {
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
    }

    pub fn size(&self) -> Point {
        self.size
    }

    pub fn set_viewport_size(&mut self, size: Point) {
        self.size = size;
    }

    pub fn tile_px(&self) -> f64 {
        self.tile_px
    }

    pub fn orientation(&self) -> OrientationMode {
        self.orientation
    }

    pub fn set_orientation(&mut self, mode: OrientationMode) {
        self.orientation = mode;
    }

    pub fn live_sample(&self) -> Option<LiveSample> {
        self.live
    }

    pub fn set_live_sample(&mut self, sample: LiveSample) {
        self.live = Some(sample);
    }

    /// Map rotation in degrees, derived from the orientation mode and live sample
    pub fn rotation_deg(&self) -> f64 {
        match (self.orientation, self.live) {
            (OrientationMode::NorthUp, _) | (_, None) => 0.0,
            (OrientationMode::TrackUp, Some(live)) => -live.ground_track_deg,
            (OrientationMode::HeadingUp, Some(live)) => -live.heading_deg,
        }
    }

    /// Planar metres per screen pixel at the current zoom
    pub fn meters_per_pixel(&self) -> f64 {
        geo::meters_per_pixel(self.zoom, self.tile_px)
    }

    pub fn center_planar(&self) -> Point {
        self.center.to_planar()
    }

    fn screen_center(&self) -> Point {
        Point::new(self.size.x / 2.0, self.size.y / 2.0)
    }

    /// Converts a screen-space offset (y down) into a planar offset (y up)
    fn screen_offset_to_planar(&self, offset: Point, mpp: f64) -> Point {
        let unrotated = offset.rotate(-self.rotation_deg());
        Point::new(unrotated.x * mpp, -unrotated.y * mpp)
    }

    /// Planar position under a screen pixel
    pub fn screen_to_planar(&self, pixel: Point) -> Point {
        let offset = pixel.subtract(&self.screen_center());
        self.center_planar()
            .add(&self.screen_offset_to_planar(offset, self.meters_per_pixel()))
    }

    /// Screen pixel of a planar position
    pub fn planar_to_screen(&self, planar: Point) -> Point {
        let delta = planar.subtract(&self.center_planar());
        let mpp = self.meters_per_pixel();
        let map_px = Point::new(delta.x / mpp, -delta.y / mpp);
        self.screen_center().add(&map_px.rotate(self.rotation_deg()))
    }

    pub fn screen_to_lat_lng(&self, pixel: Point) -> LatLng {
        geo::to_geographic(self.screen_to_planar(pixel))
    }

    pub fn lat_lng_to_screen(&self, lat_lng: &LatLng) -> Point {
        self.planar_to_screen(lat_lng.to_planar())
    }

    /// Moves the map with a drag of `(dx_px, dy_px)` screen pixels
    pub fn pan(&mut self, dx_px: f64, dy_px: f64) {
        let delta = self.screen_offset_to_planar(Point::new(dx_px, dy_px), self.meters_per_pixel());
        let center = self.center_planar().subtract(&delta);
        self.set_center(geo::to_geographic(center));
    }

    /// Steps the zoom by one level, in for `factor > 1` and out otherwise.
    ///
    /// The point under the focus pixel stays put. Returns whether the level changed.
    pub fn zoom(&mut self, factor: f64, focus_x_px: f64, focus_y_px: f64) -> bool {
        let target = if factor > 1.0 {
            self.zoom.saturating_add(1)
        } else {
            self.zoom.saturating_sub(1)
        }
        .clamp(self.min_zoom, self.max_zoom);

        if target == self.zoom {
            return false;
        }

        let focus_px = Point::new(focus_x_px, focus_y_px);
        let focus_planar = self.screen_to_planar(focus_px);
        self.zoom = target;

        let offset = focus_px.subtract(&self.screen_center());
        let new_center =
            focus_planar.subtract(&self.screen_offset_to_planar(offset, self.meters_per_pixel()));
        self.set_center(geo::to_geographic(new_center));
        true
    }

    pub fn double_tap(&mut self, x_px: f64, y_px: f64) -> bool {
        self.zoom(2.0, x_px, y_px)
    }

    /// Starts a fling with the release velocity of a drag
    pub fn fling(&mut self, vx_px_per_sec: f64, vy_px_per_sec: f64) {
        let velocity = Point::new(vx_px_per_sec, vy_px_per_sec);
        self.fling = (velocity.length() >= self.fling_stop_speed).then_some(velocity);
    }

    pub fn fling_velocity(&self) -> Option<Point> {
        self.fling
    }

    pub fn cancel_fling(&mut self) {
        self.fling = None;
    }

    /// Applies one frame of fling motion; returns whether the fling is still active
    pub fn step_fling(&mut self, dt_secs: f64) -> bool {
        let Some(velocity) = self.fling else {
            return false;
        };
        self.pan(velocity.x * dt_secs, velocity.y * dt_secs);

        let decayed = velocity.multiply(self.fling_friction);
        self.fling = (decayed.length() >= self.fling_stop_speed).then_some(decayed);
        self.fling.is_some()
    }
}

/// Cross-thread handle to a [`ViewState`]
#[derive(Debug, Clone)]
pub struct SharedView(Arc<Mutex<ViewState>>);

impl SharedView {
    pub fn new(view: ViewState) -> Self {
        Self(Arc::new(Mutex::new(view)))
    }

    /// Locks the view. A poisoned lock is recovered since the state stays consistent
    /// between whole operations.
    pub fn lock(&self) -> MutexGuard<'_, ViewState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut ViewState) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn snapshot(&self) -> ViewState {
        self.lock().clone()
    }
}
