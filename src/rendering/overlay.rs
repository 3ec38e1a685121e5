//! Layers drawn above the tiles each frame

use crate::animation::position::PositionSample;
use crate::core::geo::METERS_PER_NM;
use crate::core::viewport::ViewState;
use crate::rendering::camera::{sprite_transform, ViewTransform};
use crate::rendering::context::{GpuContext, TextureHandle};
use crate::rendering::palette::Rgba;
use crate::rendering::raster::demultiply;
use crate::{MapError, Result};
use tiny_skia::{FillRule, Paint, PathBuilder, Pixmap, Stroke, Transform};

/// What an overlay gets to see for one frame
pub struct OverlayFrame<'a> {
    pub view: &'a ViewState,
    pub transform: &'a ViewTransform,
    /// Interpolated ownship position, if the live feed has reported
    pub ownship: Option<PositionSample>,
}

/// Extension point for symbols drawn over the map
pub trait MapOverlay: Send {
    fn name(&self) -> &str;

    fn draw(&mut self, ctx: &mut dyn GpuContext, frame: &OverlayFrame<'_>);

    /// Destroys any textures the overlay created
    fn release(&mut self, ctx: &mut dyn GpuContext);
}

fn upload(ctx: &mut dyn GpuContext, pixmap: &Pixmap) -> Result<TextureHandle> {
    ctx.create_texture(pixmap.width(), pixmap.height(), &demultiply(pixmap))
}

fn paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = true;
    paint
}

/// Aircraft symbol at the interpolated position, nose along the heading
pub struct OwnshipOverlay {
    size_px: f64,
    color: Rgba,
    texture: Option<TextureHandle>,
}

impl OwnshipOverlay {
    const TEXTURE_PX: u32 = 64;

    pub fn new(size_px: f64) -> Self {
        Self {
            size_px,
            color: [255, 196, 0, 255],
            texture: None,
        }
    }

    pub fn texture(&self) -> Option<TextureHandle> {
        self.texture
    }

    fn symbol(&self) -> Result<Pixmap> {
        let s = Self::TEXTURE_PX as f32;
        let mut pixmap = Pixmap::new(Self::TEXTURE_PX, Self::TEXTURE_PX)
            .ok_or_else(|| MapError::Render("symbol pixmap".into()))?;

        let mut builder = PathBuilder::new();
        builder.move_to(s * 0.5, s * 0.06);
        builder.line_to(s * 0.88, s * 0.88);
        builder.line_to(s * 0.5, s * 0.68);
        builder.line_to(s * 0.12, s * 0.88);
        builder.close();
        let path = builder
            .finish()
            .ok_or_else(|| MapError::Render("symbol path".into()))?;

        pixmap.fill_path(&path, &paint(self.color), FillRule::Winding, Transform::identity(), None);
        let outline = Stroke {
            width: 2.0,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint([0, 0, 0, 255]), &outline, Transform::identity(), None);
        Ok(pixmap)
    }

    fn ensure_texture(&mut self, ctx: &mut dyn GpuContext) -> Option<TextureHandle> {
        if self.texture.is_none() {
            match self.symbol().and_then(|pixmap| upload(ctx, &pixmap)) {
                Ok(handle) => self.texture = Some(handle),
                Err(e) => log::warn!("ownship symbol unavailable: {}", e),
            }
        }
        self.texture
    }
}

impl Default for OwnshipOverlay {
    fn default() -> Self {
        Self::new(40.0)
    }
}

impl MapOverlay for OwnshipOverlay {
    fn name(&self) -> &str {
        "ownship"
    }

    fn draw(&mut self, ctx: &mut dyn GpuContext, frame: &OverlayFrame<'_>) {
        let Some(ownship) = frame.ownship else {
            return;
        };
        let Some(texture) = self.ensure_texture(ctx) else {
            return;
        };
        let center = frame.transform.planar_to_screen(ownship.position().to_planar());
        let rotation = ownship.heading_deg + frame.view.rotation_deg();
        ctx.draw_textured_quad(texture, &sprite_transform(center, self.size_px, rotation));
    }

    fn release(&mut self, ctx: &mut dyn GpuContext) {
        if let Some(texture) = self.texture.take() {
            ctx.destroy_texture(texture);
        }
    }
}

/// Circles of fixed ground radius around the ownship
pub struct RangeRingsOverlay {
    radii_nm: Vec<f64>,
    color: Rgba,
    /// Rings wider than this are not drawn
    max_diameter_px: u32,
    /// Ring textures by diameter in pixels
    textures: Vec<(u32, TextureHandle)>,
}

impl RangeRingsOverlay {
    pub fn new(radii_nm: Vec<f64>) -> Self {
        Self {
            radii_nm,
            color: [48, 48, 48, 220],
            max_diameter_px: 2048,
            textures: Vec::new(),
        }
    }

    pub fn radii_nm(&self) -> &[f64] {
        &self.radii_nm
    }

    /// On-screen diameter of a ring, accounting for Mercator stretch at `lat`
    pub fn diameter_px(radius_nm: f64, lat: f64, meters_per_pixel: f64) -> f64 {
        let stretch = 1.0 / lat.to_radians().cos().max(1e-6);
        2.0 * radius_nm * METERS_PER_NM * stretch / meters_per_pixel
    }

    fn ring(&self, diameter: u32) -> Result<Pixmap> {
        let mut pixmap =
            Pixmap::new(diameter, diameter).ok_or_else(|| MapError::Render("ring pixmap".into()))?;
        let r = diameter as f32 / 2.0;
        let path = PathBuilder::from_circle(r, r, (r - 1.5).max(0.5))
            .ok_or_else(|| MapError::Render("ring path".into()))?;
        let stroke = Stroke {
            width: 1.5,
            ..Stroke::default()
        };
        pixmap.stroke_path(&path, &paint(self.color), &stroke, Transform::identity(), None);
        Ok(pixmap)
    }

    /// Texture for a ring of `diameter` pixels, created on first use
    fn texture_for(&mut self, ctx: &mut dyn GpuContext, diameter: u32) -> Option<TextureHandle> {
        if let Some((_, handle)) = self.textures.iter().find(|(d, _)| *d == diameter) {
            return Some(*handle);
        }
        match self.ring(diameter).and_then(|pixmap| upload(ctx, &pixmap)) {
            Ok(handle) => {
                self.textures.push((diameter, handle));
                Some(handle)
            }
            Err(e) => {
                log::warn!("range ring of {} px unavailable: {}", diameter, e);
                None
            }
        }
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

impl MapOverlay for RangeRingsOverlay {
    fn name(&self) -> &str {
        "range-rings"
    }

    fn draw(&mut self, ctx: &mut dyn GpuContext, frame: &OverlayFrame<'_>) {
        let Some(ownship) = frame.ownship else {
            return;
        };
        let center = frame.transform.planar_to_screen(ownship.position().to_planar());
        let mpp = frame.view.meters_per_pixel();

        let wanted: Vec<u32> = self
            .radii_nm
            .iter()
            .map(|nm| Self::diameter_px(*nm, ownship.lat, mpp).round())
            .filter(|d| *d >= 4.0 && *d <= self.max_diameter_px as f64)
            .map(|d| d as u32)
            .collect();

        // Textures for diameters no longer in use belong to an older zoom
        let (keep, stale): (Vec<_>, Vec<_>) = self
            .textures
            .drain(..)
            .partition(|(d, _)| wanted.contains(d));
        self.textures = keep;
        for (_, handle) in stale {
            ctx.destroy_texture(handle);
        }

        for diameter in wanted {
            if let Some(texture) = self.texture_for(ctx, diameter) {
                ctx.draw_textured_quad(texture, &sprite_transform(center, diameter as f64, 0.0));
            }
        }
    }

    fn release(&mut self, ctx: &mut dyn GpuContext) {
        for (_, handle) in self.textures.drain(..) {
            ctx.destroy_texture(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ViewConfig;
    use crate::core::geo::{LatLng, Point};
    use crate::rendering::camera::transform_point;
    use crate::rendering::context::{DrawCommand, RecordingContext};
    use std::time::Instant;

    fn view(zoom: u8) -> ViewState {
        ViewState::new(
            &ViewConfig {
                initial_center: LatLng::new(0.0, 0.0),
                initial_zoom: zoom,
                ..ViewConfig::default()
            },
            Point::new(800.0, 600.0),
        )
    }

    fn ownship(heading: f64) -> PositionSample {
        PositionSample::new(0.0, 0.0, heading, Instant::now())
    }

    #[test]
    fn test_ownship_needs_a_position() {
        let v = view(10);
        let transform = ViewTransform::from_view(&v);
        let mut ctx = RecordingContext::new(800, 600);
        let mut overlay = OwnshipOverlay::default();
        overlay.draw(
            &mut ctx,
            &OverlayFrame {
                view: &v,
                transform: &transform,
                ownship: None,
            },
        );
        assert_eq!(ctx.quad_count(), 0);
        assert_eq!(ctx.created(), 0);
    }

    #[test]
    fn test_ownship_drawn_at_position_with_heading() {
        let v = view(10);
        let transform = ViewTransform::from_view(&v);
        let mut ctx = RecordingContext::new(800, 600);
        let mut overlay = OwnshipOverlay::new(40.0);
        let frame = OverlayFrame {
            view: &v,
            transform: &transform,
            ownship: Some(ownship(90.0)),
        };
        overlay.draw(&mut ctx, &frame);
        overlay.draw(&mut ctx, &frame);

        assert_eq!(ctx.created(), 1, "symbol texture is reused");
        let (handle, m) = ctx.quads().next().unwrap();
        assert_eq!(Some(handle), overlay.texture());
        let middle = transform_point(m, Point::new(0.5, 0.5));
        assert!(middle.distance_to(&Point::new(400.0, 300.0)) < 1e-6);
        // Heading east puts the nose on the right
        let nose = transform_point(m, Point::new(0.5, 0.0));
        assert!((nose.x - 420.0).abs() < 1e-6 && (nose.y - 300.0).abs() < 1e-6);

        overlay.release(&mut ctx);
        assert_eq!(ctx.live_textures(), 0);
    }

    #[test]
    fn test_ring_diameter() {
        // 1 nm at the equator with 1852 m per pixel is two pixels across
        assert!((RangeRingsOverlay::diameter_px(1.0, 0.0, 1852.0) - 2.0).abs() < 1e-9);
        // Mercator doubles distances at 60 degrees
        assert!((RangeRingsOverlay::diameter_px(1.0, 60.0, 1852.0) - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_ring_textures_follow_zoom() {
        let mut ctx = RecordingContext::new(800, 600);
        let mut rings = RangeRingsOverlay::new(vec![5.0, 10.0]);

        let v = view(10);
        let transform = ViewTransform::from_view(&v);
        rings.draw(
            &mut ctx,
            &OverlayFrame {
                view: &v,
                transform: &transform,
                ownship: Some(ownship(0.0)),
            },
        );
        assert_eq!(rings.texture_count(), 2);
        assert_eq!(ctx.quad_count(), 2);

        let v = view(9);
        let transform = ViewTransform::from_view(&v);
        rings.draw(
            &mut ctx,
            &OverlayFrame {
                view: &v,
                transform: &transform,
                ownship: Some(ownship(0.0)),
            },
        );
        assert_eq!(rings.texture_count(), 2);
        assert_eq!(ctx.live_textures(), 2);
        assert!(ctx
            .commands()
            .iter()
            .all(|c| matches!(c, DrawCommand::Quad { .. })));

        rings.release(&mut ctx);
        assert_eq!(ctx.live_textures(), 0);
    }
}
