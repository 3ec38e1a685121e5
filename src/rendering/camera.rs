use crate::core::geo::{self, Point, TileCoord};
use crate::core::viewport::ViewState;
use nalgebra::{Matrix3, Point2, Rotation2, Vector2};

/// Affine map from planar metres to screen pixels for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct ViewTransform {
    matrix: Matrix3<f64>,
}

impl ViewTransform {
    /// `screen = viewport_center + R(rotation) * diag(1/mpp, -1/mpp) * (planar - center)`
    pub fn new(center_planar: Point, meters_per_pixel: f64, rotation_deg: f64, viewport_size: Point) -> Self {
        let to_origin = Matrix3::new_translation(&Vector2::new(-center_planar.x, -center_planar.y));
        let scale = Matrix3::new_nonuniform_scaling(&Vector2::new(
            1.0 / meters_per_pixel,
            -1.0 / meters_per_pixel,
        ));
        let rotation = Rotation2::new(rotation_deg.to_radians()).to_homogeneous();
        let to_screen =
            Matrix3::new_translation(&Vector2::new(viewport_size.x / 2.0, viewport_size.y / 2.0));

        Self {
            matrix: to_screen * rotation * scale * to_origin,
        }
    }

    pub fn from_view(view: &ViewState) -> Self {
        Self::new(
            view.center_planar(),
            view.meters_per_pixel(),
            view.rotation_deg(),
            view.size(),
        )
    }

    pub fn matrix(&self) -> &Matrix3<f64> {
        &self.matrix
    }

    pub fn planar_to_screen(&self, planar: Point) -> Point {
        transform_point(&self.matrix, planar)
    }

    pub fn screen_to_planar(&self, pixel: Point) -> Option<Point> {
        let inverse = self.matrix.try_inverse()?;
        Some(transform_point(&inverse, pixel))
    }

    /// Unit quad to the screen footprint of a tile
    pub fn tile_quad(&self, coord: TileCoord) -> Matrix3<f64> {
        self.matrix * tile_to_planar(coord)
    }
}

/// Unit quad to a tile's planar bounds, quad y = 0 at the tile's north edge
pub fn tile_to_planar(coord: TileCoord) -> Matrix3<f64> {
    let bounds = geo::tile_bounds(coord);
    Matrix3::new_translation(&Vector2::new(bounds.min.x, bounds.max.y))
        * Matrix3::new_nonuniform_scaling(&Vector2::new(bounds.width(), -bounds.height()))
}

/// Unit quad to a `size_px` square centred on `center`, turned clockwise by `rotation_deg`
pub fn sprite_transform(center: Point, size_px: f64, rotation_deg: f64) -> Matrix3<f64> {
    Matrix3::new_translation(&Vector2::new(center.x, center.y))
        * Rotation2::new(rotation_deg.to_radians()).to_homogeneous()
        * Matrix3::new_scaling(size_px)
        * Matrix3::new_translation(&Vector2::new(-0.5, -0.5))
}

pub fn transform_point(matrix: &Matrix3<f64>, point: Point) -> Point {
    let p = matrix.transform_point(&Point2::new(point.x, point.y));
    Point::new(p.x, p.y)
}
