use crate::prelude::HashMap;
use crate::{MapError, Result};
use nalgebra::Matrix3;

/// Opaque id of a texture owned by a [`GpuContext`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(u64);

impl TextureHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Pixel rectangle of the drawing surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl ViewportRect {
    pub fn full(size: (u32, u32)) -> Self {
        Self {
            x: 0,
            y: 0,
            width: size.0,
            height: size.1,
        }
    }
}

/// The drawing surface and texture store of the render thread.
///
/// Passed explicitly to whatever needs the GPU. Only the render thread holds one.
pub trait GpuContext {
    /// Uploads a tightly packed RGBA8 image
    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureHandle>;

    /// Frees a texture. Unknown handles are ignored.
    fn destroy_texture(&mut self, handle: TextureHandle);

    /// Draws a texture on the unit quad `(0,0)..(1,1)` mapped to screen pixels by `transform`.
    /// Texture row 0 sits at quad y = 0.
    fn draw_textured_quad(&mut self, handle: TextureHandle, transform: &Matrix3<f64>);

    fn set_viewport(&mut self, viewport: ViewportRect);

    /// Restores the full-surface viewport
    fn reset_viewport(&mut self);

    fn surface_size(&self) -> (u32, u32);
}

/// Commands captured by [`RecordingContext`]
#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Viewport(ViewportRect),
    ResetViewport,
    Quad {
        handle: TextureHandle,
        transform: Matrix3<f64>,
    },
}

/// Headless [`GpuContext`] that keeps textures in memory and records draws.
///
/// Used by tests and the headless driver. Draws against handles it does not
/// hold are counted in [`RecordingContext::invalid_draws`].
#[derive(Debug, Default)]
pub struct RecordingContext {
    width: u32,
    height: u32,
    next_id: u64,
    textures: HashMap<TextureHandle, (u32, u32)>,
    commands: Vec<DrawCommand>,
    created: usize,
    destroyed: usize,
    invalid_draws: usize,
    /// Creation fails once this many textures are live
    texture_limit: Option<usize>,
    fail_next: usize,
}

impl RecordingContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            next_id: 1,
            ..Self::default()
        }
    }

    /// Caps the number of live textures; creations beyond it fail
    pub fn with_texture_limit(mut self, limit: usize) -> Self {
        self.texture_limit = Some(limit);
        self
    }

    /// Makes the next `count` texture creations fail
    pub fn fail_next_creates(&mut self, count: usize) {
        self.fail_next = count;
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Clears the recorded commands
    pub fn begin_frame(&mut self) {
        self.commands.clear();
    }

    pub fn commands(&self) -> &[DrawCommand] {
        &self.commands
    }

    pub fn quads(&self) -> impl Iterator<Item = (TextureHandle, &Matrix3<f64>)> + '_ {
        self.commands.iter().filter_map(|command| match command {
            DrawCommand::Quad { handle, transform } => Some((*handle, transform)),
            _ => None,
        })
    }

    pub fn quad_count(&self) -> usize {
        self.quads().count()
    }

    pub fn is_live(&self, handle: TextureHandle) -> bool {
        self.textures.contains_key(&handle)
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn texture_size(&self, handle: TextureHandle) -> Option<(u32, u32)> {
        self.textures.get(&handle).copied()
    }

    pub fn created(&self) -> usize {
        self.created
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed
    }

    pub fn invalid_draws(&self) -> usize {
        self.invalid_draws
    }
}

impl GpuContext for RecordingContext {
    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> Result<TextureHandle> {
        if self.fail_next > 0 {
            self.fail_next -= 1;
            return Err(MapError::Render("texture creation failed".into()));
        }
        if width == 0 || height == 0 || rgba.len() != (width as usize) * (height as usize) * 4 {
            return Err(MapError::Render(format!(
                "{} bytes do not describe a {}x{} RGBA image",
                rgba.len(),
                width,
                height
            )));
        }
        if let Some(limit) = self.texture_limit {
            if self.textures.len() >= limit {
                return Err(MapError::Render(format!("texture limit {limit} reached")));
            }
        }

        let handle = TextureHandle::new(self.next_id.max(1));
        self.next_id = handle.id() + 1;
        self.textures.insert(handle, (width, height));
        self.created += 1;
        Ok(handle)
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        if self.textures.remove(&handle).is_some() {
            self.destroyed += 1;
        }
    }

    fn draw_textured_quad(&mut self, handle: TextureHandle, transform: &Matrix3<f64>) {
        if !self.textures.contains_key(&handle) {
            self.invalid_draws += 1;
        }
        self.commands.push(DrawCommand::Quad {
            handle,
            transform: *transform,
        });
    }

    fn set_viewport(&mut self, viewport: ViewportRect) {
        self.commands.push(DrawCommand::Viewport(viewport));
    }

    fn reset_viewport(&mut self) {
        self.commands.push(DrawCommand::ResetViewport);
    }

    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_lifecycle() {
        let mut ctx = RecordingContext::new(640, 480);
        let a = ctx.create_texture(2, 2, &[0; 16]).unwrap();
        let b = ctx.create_texture(1, 1, &[0; 4]).unwrap();
        assert_ne!(a, b);
        assert_eq!(ctx.live_textures(), 2);
        assert_eq!(ctx.texture_size(a), Some((2, 2)));

        ctx.destroy_texture(a);
        ctx.destroy_texture(a);
        assert_eq!(ctx.destroyed(), 1);
        assert!(!ctx.is_live(a));
        assert!(ctx.is_live(b));
    }

    #[test]
    fn test_bad_buffer_rejected() {
        let mut ctx = RecordingContext::new(10, 10);
        assert!(ctx.create_texture(2, 2, &[0; 15]).is_err());
        assert!(ctx.create_texture(0, 2, &[]).is_err());
        assert_eq!(ctx.created(), 0);
    }

    #[test]
    fn test_injected_failures() {
        let mut ctx = RecordingContext::new(10, 10).with_texture_limit(1);
        ctx.fail_next_creates(1);
        assert!(ctx.create_texture(1, 1, &[0; 4]).is_err());
        assert!(ctx.create_texture(1, 1, &[0; 4]).is_ok());
        assert!(ctx.create_texture(1, 1, &[0; 4]).is_err());
    }

    #[test]
    fn test_draws_are_recorded() {
        let mut ctx = RecordingContext::new(100, 50);
        let tex = ctx.create_texture(1, 1, &[255; 4]).unwrap();
        ctx.set_viewport(ViewportRect::full(ctx.surface_size()));
        ctx.draw_textured_quad(tex, &Matrix3::identity());
        ctx.draw_textured_quad(TextureHandle::new(999), &Matrix3::identity());
        ctx.reset_viewport();

        assert_eq!(ctx.commands().len(), 4);
        assert_eq!(ctx.quad_count(), 2);
        assert_eq!(ctx.invalid_draws(), 1);

        ctx.begin_frame();
        assert!(ctx.commands().is_empty());
    }
}
