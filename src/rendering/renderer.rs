use crate::animation::position::{LiveSample, PositionInterpolator, PositionSample};
use crate::core::config::MapEngineConfig;
use crate::core::geo::{Point, TileCoord};
use crate::core::viewport::{OrientationMode, SharedView, ViewState};
use crate::input::gestures::GestureInput;
use crate::prelude::HashSet;
use crate::rendering::camera::ViewTransform;
use crate::rendering::context::{GpuContext, ViewportRect};
use crate::rendering::overlay::{MapOverlay, OverlayFrame, OwnshipOverlay, RangeRingsOverlay};
use crate::runtime::TileSpawner;
use crate::tiles::cache::TileCache;
use crate::tiles::source::TileStore;
use crate::Result;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Summary of one rendered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameStats {
    pub frame: u64,
    /// Tiles covering the viewport
    pub visible: usize,
    /// Visible tiles drawn from a resident texture
    pub drawn: usize,
    /// Fetches scheduled this frame
    pub requested: usize,
    pub uploaded: usize,
    pub elapsed: Duration,
    pub over_budget: bool,
}

/// Cloneable handle through which the live feed reaches the renderer
#[derive(Debug, Clone)]
pub struct PositionInput {
    view: SharedView,
    interpolator: Arc<Mutex<PositionInterpolator>>,
}

impl PositionInput {
    pub fn push(&self, sample: LiveSample) {
        self.push_at(sample, Instant::now());
    }

    /// Records a sample as arriving at `now`
    pub fn push_at(&self, sample: LiveSample, now: Instant) {
        self.interpolator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_live(&sample, now);
        self.view.update(|view| view.set_live_sample(sample));
    }
}

/// Per-frame orchestration: view update, visible tiles, uploads and overlays.
///
/// Owns the GPU context and is driven from the render thread only.
pub struct Renderer<C: GpuContext> {
    ctx: C,
    view: SharedView,
    cache: TileCache,
    interpolator: Arc<Mutex<PositionInterpolator>>,
    overlays: Vec<Box<dyn MapOverlay>>,
    uploads_per_frame: usize,
    budget: Duration,
    nominal_dt: f64,
    last_frame: Option<Instant>,
    frame: u64,
    /// Set once the visible set has outgrown the cache
    capacity_warned: bool,
}

impl<C: GpuContext> Renderer<C> {
    /// Renderer with the standard ownship and range-ring overlays
    pub fn new(
        ctx: C,
        config: &MapEngineConfig,
        store: Arc<dyn TileStore>,
        spawner: Arc<dyn TileSpawner>,
    ) -> Result<Self> {
        let mut renderer = Self::without_overlays(ctx, config, store, spawner)?;
        renderer.add_overlay(Box::new(RangeRingsOverlay::new(config.position.range_rings_nm.clone())));
        renderer.add_overlay(Box::new(OwnshipOverlay::default()));
        Ok(renderer)
    }

    /// Fails if `config` does not validate
    pub fn without_overlays(
        ctx: C,
        config: &MapEngineConfig,
        store: Arc<dyn TileStore>,
        spawner: Arc<dyn TileSpawner>,
    ) -> Result<Self> {
        let cache = TileCache::new(config, store, spawner)?;
        let (width, height) = ctx.surface_size();
        let view = ViewState::new(&config.view, Point::new(width as f64, height as f64));
        let nominal_dt = config
            .frame
            .target_frame_duration_ms()
            .map(|ms| ms as f64 / 1000.0)
            .unwrap_or(1.0 / 60.0);

        Ok(Self {
            ctx,
            view: SharedView::new(view),
            cache,
            interpolator: Arc::new(Mutex::new(PositionInterpolator::new(
                config.position.sample_interval(),
            ))),
            overlays: Vec::new(),
            uploads_per_frame: config.tile_cache.uploads_per_frame,
            budget: config.frame.budget(),
            nominal_dt,
            last_frame: None,
            frame: 0,
            capacity_warned: false,
        })
    }

    pub fn add_overlay(&mut self, overlay: Box<dyn MapOverlay>) {
        log::debug!("overlay '{}' added", overlay.name());
        self.overlays.push(overlay);
    }

    pub fn view(&self) -> SharedView {
        self.view.clone()
    }

    pub fn gesture_input(&self) -> GestureInput {
        GestureInput::new(self.view.clone())
    }

    pub fn position_input(&self) -> PositionInput {
        PositionInput {
            view: self.view.clone(),
            interpolator: Arc::clone(&self.interpolator),
        }
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    /// Interpolated ownship position at `now`
    pub fn ownship_at(&self, now: Instant) -> Option<PositionSample> {
        self.interpolator
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sample_at(now)
    }

    /// Tiles covering the rotated viewport plus a one-tile margin, nearest first
    pub fn visible_tiles(view: &ViewState) -> Vec<TileCoord> {
        let zoom = view.zoom_level();
        let last = (1i64 << zoom) - 1;
        let center = TileCoord::from_lat_lng(&view.center(), zoom);
        let size = view.size();
        let (sin, cos) = view.rotation_deg().to_radians().sin_cos();
        let (sin, cos) = (sin.abs(), cos.abs());
        // Axis-aligned extent of the rotated viewport, plus one tile of margin
        let half_x = (size.x * cos + size.y * sin) / 2.0;
        let half_y = (size.x * sin + size.y * cos) / 2.0;
        let radius_x = (half_x / view.tile_px()).ceil() as i64 + 1;
        let radius_y = (half_y / view.tile_px()).ceil() as i64 + 1;

        let mut offsets: Vec<(i64, i64)> = (-radius_y..=radius_y)
            .flat_map(|dy| (-radius_x..=radius_x).map(move |dx| (dx, dy)))
            .collect();
        offsets.sort_by_key(|(dx, dy)| dx * dx + dy * dy);

        let mut seen = HashSet::default();
        offsets
            .into_iter()
            .map(|(dx, dy)| {
                let x = (center.x as i64 + dx).clamp(0, last) as u32;
                let y = (center.y as i64 + dy).clamp(0, last) as u32;
                TileCoord::new(x, y, zoom)
            })
            .filter(|coord| seen.insert(*coord))
            .collect()
    }

    /// Renders one frame. Always completes; running over the budget is only logged.
    pub fn render_frame(&mut self, now: Instant) -> FrameStats {
        let started = Instant::now();
        self.frame += 1;

        let dt = self
            .last_frame
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(self.nominal_dt);
        self.last_frame = Some(now);

        let ownship = self.ownship_at(now);
        let view = self.view.update(|view| {
            if view.orientation() != OrientationMode::NorthUp {
                if let Some(live) = view.live_sample() {
                    let position = ownship.map(|o| o.position()).unwrap_or_else(|| live.position());
                    view.set_center(position);
                }
            }
            view.step_fling(dt);
            view.clone()
        });
        let transform = ViewTransform::from_view(&view);

        let size = view.size();
        self.ctx.set_viewport(ViewportRect {
            x: 0,
            y: 0,
            width: size.x.max(0.0) as u32,
            height: size.y.max(0.0) as u32,
        });

        let visible = Self::visible_tiles(&view);
        let mut stats = FrameStats {
            frame: self.frame,
            visible: visible.len(),
            ..FrameStats::default()
        };
        if visible.len() > self.cache.capacity() && !self.capacity_warned {
            log::warn!(
                "{} visible tiles exceed the cache capacity of {}; outer tiles will flicker",
                visible.len(),
                self.cache.capacity()
            );
            self.capacity_warned = true;
        }

        for coord in &visible {
            if self.cache.request_tile(*coord) {
                stats.requested += 1;
            }
        }
        // Far to near, so the tiles around the centre are the most recently used
        for coord in visible.iter().rev() {
            if let Some(texture) = self.cache.get_texture(*coord) {
                self.ctx.draw_textured_quad(texture, &transform.tile_quad(*coord));
                stats.drawn += 1;
            }
        }

        stats.uploaded = self.cache.drain_uploads(&mut self.ctx, self.uploads_per_frame);

        let frame = OverlayFrame {
            view: &view,
            transform: &transform,
            ownship,
        };
        for overlay in &mut self.overlays {
            overlay.draw(&mut self.ctx, &frame);
        }

        self.ctx.reset_viewport();

        stats.elapsed = started.elapsed();
        stats.over_budget = stats.elapsed > self.budget;
        if stats.over_budget {
            log::warn!(
                "frame {} took {:?}, over the {:?} budget",
                stats.frame,
                stats.elapsed,
                self.budget
            );
        }
        stats
    }

    /// Destroys every texture held by the cache and the overlays
    pub fn release(&mut self) {
        self.cache.release(&mut self.ctx);
        for overlay in &mut self.overlays {
            overlay.release(&mut self.ctx);
        }
        log::info!("renderer released after {} frames", self.frame);
    }
}
