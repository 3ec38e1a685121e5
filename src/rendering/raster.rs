//! Software rasterization of vector tiles into RGBA buffers

use crate::core::config::RasterConfig;
use crate::data::mvt::{self, GeometryType, VectorFeature, VectorLayer};
use crate::rendering::palette::{self, FeatureStyle, LineStyle, Rgba};
use crate::{MapError, Result};
use std::path::Path;
use tiny_skia::{
    Color, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Stroke, Transform,
};

/// Line widths in the palette are given for a raster of this size
const REFERENCE_SIZE: f32 = 512.0;

/// Square RGBA buffer with straight (non-premultiplied) alpha, row-major from the top-left
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileRaster {
    pub size: u32,
    pub pixels: Vec<u8>,
}

impl TileRaster {
    /// Buffer filled with one colour
    pub fn solid(size: u32, color: Rgba) -> Self {
        Self {
            size,
            pixels: color.repeat((size * size) as usize),
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.size || y >= self.size {
            return None;
        }
        let i = ((y * self.size + x) * 4) as usize;
        let px = self.pixels.get(i..i + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }

    pub fn to_image(&self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.size, self.size, self.pixels.clone())
    }

    pub fn save_png(&self, path: impl AsRef<Path>) -> Result<()> {
        let image = self
            .to_image()
            .ok_or_else(|| MapError::Render("raster buffer does not match its size".into()))?;
        image
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| MapError::Render(format!("png export failed: {e}")))
    }
}

/// Turns vector tile payloads into fixed-size rasters.
///
/// Holds only its output settings, so one instance can serve many workers.
#[derive(Debug, Clone, PartialEq)]
pub struct Rasterizer {
    size: u32,
    background: Rgba,
}

impl Rasterizer {
    pub fn new(config: &RasterConfig) -> Self {
        Self {
            size: config.size.max(1),
            background: config.background,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn background(&self) -> Rgba {
        self.background
    }

    /// Rasterizes a payload. Undecodable input yields the background alone.
    pub fn rasterize(&self, bytes: &[u8]) -> TileRaster {
        match mvt::decode_tile(bytes) {
            Ok(layers) => self.rasterize_layers(&layers),
            Err(e) => {
                log::debug!("undecodable tile payload ({} bytes): {}", bytes.len(), e);
                TileRaster::solid(self.size, self.background)
            }
        }
    }

    pub fn rasterize_layers(&self, layers: &[VectorLayer]) -> TileRaster {
        let Some(mut pixmap) = Pixmap::new(self.size, self.size) else {
            return TileRaster::solid(self.size, self.background);
        };
        let [r, g, b, a] = self.background;
        pixmap.fill(Color::from_rgba8(r, g, b, a));

        // Paint in palette rank order; stable sort keeps payload order within a rank
        let mut ordered: Vec<(u8, &VectorLayer)> = layers
            .iter()
            .filter_map(|layer| palette::layer_rank(&layer.name).map(|rank| (rank, layer)))
            .collect();
        ordered.sort_by_key(|(rank, _)| *rank);

        for (_, layer) in ordered {
            let scale = self.size as f32 / layer.extent as f32;
            for feature in &layer.features {
                let style = palette::style_for(&layer.name, feature.property("class"));
                self.draw_feature(&mut pixmap, feature, style, scale);
            }
        }

        TileRaster {
            size: self.size,
            pixels: demultiply(&pixmap),
        }
    }

    fn draw_feature(&self, pixmap: &mut Pixmap, feature: &VectorFeature, style: FeatureStyle, scale: f32) {
        let FeatureStyle::Paint { fill, line } = style else {
            return;
        };
        match (feature.geometry_type, fill, line) {
            (GeometryType::Polygon, Some(color), _) => {
                if let Some(path) = build_path(&feature.paths, scale, true) {
                    pixmap.fill_path(&path, &paint(color), FillRule::EvenOdd, Transform::identity(), None);
                }
            }
            (GeometryType::LineString, _, Some(line)) => {
                if let Some(path) = build_path(&feature.paths, scale, false) {
                    pixmap.stroke_path(
                        &path,
                        &paint(line.color),
                        &self.stroke(line),
                        Transform::identity(),
                        None,
                    );
                }
            }
            _ => {}
        }
    }

    fn stroke(&self, line: LineStyle) -> Stroke {
        Stroke {
            width: (line.width * self.size as f32 / REFERENCE_SIZE).max(0.5),
            line_cap: LineCap::Round,
            line_join: LineJoin::Round,
            ..Stroke::default()
        }
    }
}

fn paint(color: Rgba) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color[0], color[1], color[2], color[3]);
    paint.anti_alias = true;
    paint
}

fn build_path(paths: &[Vec<(i32, i32)>], scale: f32, close: bool) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();
    for path in paths {
        let Some(((x0, y0), rest)) = path.split_first() else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        builder.move_to(*x0 as f32 * scale, *y0 as f32 * scale);
        for (x, y) in rest {
            builder.line_to(*x as f32 * scale, *y as f32 * scale);
        }
        if close {
            builder.close();
        }
    }
    builder.finish()
}

/// Straight-alpha RGBA bytes of a pixmap
pub(crate) fn demultiply(pixmap: &Pixmap) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixmap.data().len());
    for px in pixmap.pixels() {
        let c = px.demultiply();
        out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::mvt::VectorTileBuilder;

    const WATER: Rgba = [170, 211, 223, 255];
    const BUILDING: Rgba = [217, 208, 201, 255];

    fn rasterizer() -> Rasterizer {
        Rasterizer::new(&RasterConfig::default())
    }

    fn full_square() -> Vec<(i32, i32)> {
        vec![(0, 0), (4096, 0), (4096, 4096), (0, 4096)]
    }

    #[test]
    fn test_garbage_gives_background() {
        let r = rasterizer();
        let raster = r.rasterize(b"definitely not a tile");
        assert_eq!(raster.size, 512);
        assert_eq!(raster.byte_len(), 512 * 512 * 4);
        assert_eq!(raster.pixel(0, 0), Some(r.background()));
        assert_eq!(raster.pixel(511, 511), Some(r.background()));
    }

    #[test]
    fn test_water_fill() {
        let bytes = VectorTileBuilder::new()
            .feature("water", GeometryType::Polygon, &[], vec![full_square()])
            .build();
        let raster = rasterizer().rasterize(&bytes);
        assert_eq!(raster.pixel(256, 256), Some(WATER));
    }

    #[test]
    fn test_draw_order_ignores_payload_order() {
        // Building listed before the water underneath it still ends up on top
        let bytes = VectorTileBuilder::new()
            .feature(
                "building",
                GeometryType::Polygon,
                &[],
                vec![vec![(1024, 1024), (3072, 1024), (3072, 3072), (1024, 3072)]],
            )
            .feature("water", GeometryType::Polygon, &[], vec![full_square()])
            .build();
        let raster = rasterizer().rasterize(&bytes);
        assert_eq!(raster.pixel(256, 256), Some(BUILDING));
        assert_eq!(raster.pixel(20, 20), Some(WATER));
    }

    #[test]
    fn test_unknown_layers_and_classes_skipped() {
        let r = rasterizer();
        let bytes = VectorTileBuilder::new()
            .feature("poi", GeometryType::Polygon, &[], vec![full_square()])
            .feature("landcover", GeometryType::Polygon, &[("class", "moon")], vec![full_square()])
            .build();
        let raster = r.rasterize(&bytes);
        assert_eq!(raster.pixel(256, 256), Some(r.background()));
    }

    #[test]
    fn test_road_stroke() {
        let r = rasterizer();
        let bytes = VectorTileBuilder::new()
            .feature(
                "transportation",
                GeometryType::LineString,
                &[("class", "motorway")],
                vec![vec![(0, 2048), (4096, 2048)]],
            )
            .build();
        let raster = r.rasterize(&bytes);
        assert_eq!(raster.pixel(100, 256), Some([160, 160, 160, 255]));
        assert_eq!(raster.pixel(100, 100), Some(r.background()));
    }

    #[test]
    fn test_extent_scaling() {
        // A layer with extent 256 covering its left half maps to the left half of the raster
        let layer = VectorLayer {
            name: "water".into(),
            extent: 256,
            features: vec![VectorFeature {
                id: None,
                geometry_type: GeometryType::Polygon,
                properties: Default::default(),
                paths: vec![vec![(0, 0), (128, 0), (128, 256), (0, 256), (0, 0)]],
            }],
        };
        let r = rasterizer();
        let raster = r.rasterize_layers(&[layer]);
        assert_eq!(raster.pixel(64, 300), Some(WATER));
        assert_eq!(raster.pixel(400, 300), Some(r.background()));
    }

    #[test]
    fn test_custom_size() {
        let r = Rasterizer::new(&RasterConfig {
            size: 64,
            ..RasterConfig::default()
        });
        let raster = r.rasterize(&[]);
        assert_eq!(raster.size, 64);
        assert_eq!(raster.pixels.len(), 64 * 64 * 4);
    }

    #[test]
    fn test_png_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tile.png");
        let raster = TileRaster::solid(8, WATER);
        raster.save_png(&path).unwrap();
        let decoded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(decoded.get_pixel(3, 3).0, WATER);
    }
}
