use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// Spherical Web Mercator constants
pub const EARTH_RADIUS: f64 = 6378137.0;
pub const MAX_LATITUDE: f64 = 85.0511287798;

/// Half the side of the square planar extent, in metres.
pub const HALF_EXTENT: f64 = PI * EARTH_RADIUS;

pub const METERS_PER_NM: f64 = 1852.0;

/// Represents a geographical coordinate with latitude and longitude
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    /// Creates a new LatLng coordinate
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Calculates the distance to another LatLng using the Haversine formula
    pub fn distance_to(&self, other: &LatLng) -> f64 {
        let lat1_rad = self.lat.to_radians();
        let lat2_rad = other.lat.to_radians();
        let delta_lat = (other.lat - self.lat).to_radians();
        let delta_lng = (other.lng - self.lng).to_radians();

        let a = (delta_lat / 2.0).sin().powi(2)
            + lat1_rad.cos() * lat2_rad.cos() * (delta_lng / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS * c
    }

    /// Wraps longitude to [-180, 180) range
    pub fn wrap_lng(lng: f64) -> f64 {
        (lng + 180.0).rem_euclid(360.0) - 180.0
    }

    /// Clamps latitude to the projection's valid range
    pub fn clamp_lat(lat: f64) -> f64 {
        lat.clamp(-MAX_LATITUDE, MAX_LATITUDE)
    }

    /// Projects onto the planar extent
    pub fn to_planar(&self) -> Point {
        to_planar(self.lat, self.lng)
    }
}

impl Default for LatLng {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// A point in planar (metres) or screen (pixels) space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn add(&self, other: &Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    pub fn subtract(&self, other: &Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    pub fn multiply(&self, scalar: f64) -> Point {
        Point::new(self.x * scalar, self.y * scalar)
    }

    pub fn length(&self) -> f64 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn distance_to(&self, other: &Point) -> f64 {
        self.subtract(other).length()
    }

    /// Rotates counter-clockwise by `degrees` in a y-up frame
    pub fn rotate(&self, degrees: f64) -> Point {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Point::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }
}

impl Default for Point {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

/// Axis-aligned rectangle in planar metres (y grows north)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlanarRect {
    pub min: Point,
    pub max: Point,
}

impl PlanarRect {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.min.x && point.x <= self.max.x && point.y >= self.min.y && point.y <= self.max.y
    }
}

/// Tile address in the slippy-map convention (row 0 is the northern edge)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl TileCoord {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Tile containing the given coordinate at `zoom`
    pub fn from_lat_lng(lat_lng: &LatLng, zoom: u8) -> Self {
        let (x, y) = tile_index_for(lat_lng.lat, lat_lng.lng, zoom);
        Self::new(x, y, zoom)
    }

    /// Number of tiles along one axis at this zoom
    pub fn tiles_per_axis(&self) -> u32 {
        1u32 << self.z
    }

    /// Checks if the tile is valid for its zoom level
    pub fn is_valid(&self) -> bool {
        self.z < 32 && self.x < self.tiles_per_axis() && self.y < self.tiles_per_axis()
    }

    /// Checks validity and that the zoom lies inside `[min_zoom, max_zoom]`
    pub fn is_within(&self, min_zoom: u8, max_zoom: u8) -> bool {
        self.is_valid() && (min_zoom..=max_zoom).contains(&self.z)
    }

    /// Row index in the bottom-up (TMS) convention
    pub fn flipped_row(&self) -> u32 {
        self.tiles_per_axis() - 1 - self.y
    }

    /// Planar bounds of the tile
    pub fn planar_bounds(&self) -> PlanarRect {
        tile_bounds(*self)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Projects a geographic coordinate onto the planar extent `[-HALF_EXTENT, HALF_EXTENT]²`.
///
/// Latitude is clamped to the Mercator limit so the poles never reach infinity.
pub fn to_planar(lat: f64, lng: f64) -> Point {
    let lat_rad = LatLng::clamp_lat(lat).to_radians();
    let x = lng.to_radians() * EARTH_RADIUS;
    let y = (PI / 4.0 + lat_rad / 2.0).tan().ln() * EARTH_RADIUS;
    Point::new(x, y)
}

/// Inverse of [`to_planar`].
pub fn to_geographic(point: Point) -> LatLng {
    let lng = (point.x / EARTH_RADIUS).to_degrees();
    let lat = (2.0 * (point.y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    LatLng::new(lat, lng)
}

/// Column and row of the tile containing `(lat, lng)` at `zoom`.
///
/// Columns wrap across the antimeridian; rows clamp at the projection edges.
pub fn tile_index_for(lat: f64, lng: f64, zoom: u8) -> (u32, u32) {
    let planar = to_planar(lat, lng);
    let n = 2_f64.powi(zoom as i32);
    let tiles = 1i64 << zoom;

    let column = ((planar.x + HALF_EXTENT) / (2.0 * HALF_EXTENT) * n).floor() as i64;
    let row = ((HALF_EXTENT - planar.y) / (2.0 * HALF_EXTENT) * n).floor() as i64;

    (
        column.rem_euclid(tiles) as u32,
        row.clamp(0, tiles - 1) as u32,
    )
}

/// Planar bounds of a tile
pub fn tile_bounds(coord: TileCoord) -> PlanarRect {
    let size = 2.0 * HALF_EXTENT / 2_f64.powi(coord.z as i32);
    let min_x = -HALF_EXTENT + coord.x as f64 * size;
    let max_y = HALF_EXTENT - coord.y as f64 * size;
    PlanarRect::new(Point::new(min_x, max_y - size), Point::new(min_x + size, max_y))
}

/// Planar metres covered by one screen pixel at `zoom` with `tile_px` pixel tiles
pub fn meters_per_pixel(zoom: u8, tile_px: f64) -> f64 {
    2.0 * HALF_EXTENT / (tile_px * 2_f64.powi(zoom as i32))
}

/// Largest integer zoom at which `half_range_nm` still fits in `half_extent_px` pixels.
///
/// Accounts for Mercator stretch at `lat`; the result is clamped to `[min_zoom, max_zoom]`.
pub fn zoom_for_half_range_nm(
    half_range_nm: f64,
    half_extent_px: f64,
    lat: f64,
    tile_px: f64,
    min_zoom: u8,
    max_zoom: u8,
) -> u8 {
    if !(half_range_nm > 0.0) || !(half_extent_px > 0.0) || !(tile_px > 0.0) {
        return max_zoom;
    }
    let stretch = LatLng::clamp_lat(lat).to_radians().cos().recip();
    let planar_m = half_range_nm * METERS_PER_NM * stretch;
    let mpp = planar_m / half_extent_px;
    let zoom = (2.0 * HALF_EXTENT / (tile_px * mpp)).log2().floor();

    if zoom.is_nan() {
        return min_zoom;
    }
    zoom.clamp(min_zoom as f64, max_zoom as f64) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lat_lng_distance() {
        let nyc = LatLng::new(40.7128, -74.0060);
        let la = LatLng::new(34.0522, -118.2437);
        let distance = nyc.distance_to(&la);

        // Distance should be approximately 3944 km
        assert!((distance - 3944000.0).abs() < 10000.0);
    }

    #[test]
    fn test_wrap_lng() {
        assert_eq!(LatLng::wrap_lng(190.0), -170.0);
        assert_eq!(LatLng::wrap_lng(-190.0), 170.0);
        assert_eq!(LatLng::wrap_lng(45.0), 45.0);
    }

    #[test]
    fn test_planar_round_trip() {
        for (lat, lng) in [(0.0, 0.0), (51.5, -0.12), (-33.9, 151.2), (84.0, 179.9), (-70.0, -179.0)] {
            let back = to_geographic(to_planar(lat, lng));
            assert!((back.lat - lat).abs() < 1e-9, "lat {lat} came back as {}", back.lat);
            assert!((back.lng - lng).abs() < 1e-9, "lng {lng} came back as {}", back.lng);
        }
    }

    #[test]
    fn test_poles_are_clamped() {
        let north = to_planar(90.0, 0.0);
        assert!(north.y.is_finite());
        assert!((north.y - HALF_EXTENT).abs() < 1.0);
        let south = to_planar(-90.0, 0.0);
        assert!((south.y + HALF_EXTENT).abs() < 1.0);
    }

    #[test]
    fn test_origin_maps_to_center_tile() {
        for z in 1..=18u8 {
            let half = 1u32 << (z - 1);
            assert_eq!(tile_index_for(0.0, 0.0, z), (half, half), "zoom {z}");
        }
    }

    #[test]
    fn test_column_wraps_at_antimeridian() {
        let (col, _) = tile_index_for(10.0, 180.0, 4);
        assert_eq!(col, 0);
        let (col, _) = tile_index_for(10.0, -180.0, 4);
        assert_eq!(col, 0);
        let (col, _) = tile_index_for(10.0, 179.999, 4);
        assert_eq!(col, 15);
    }

    #[test]
    fn test_row_clamped_at_poles() {
        assert_eq!(tile_index_for(-90.0, 0.0, 5).1, 31);
        assert_eq!(tile_index_for(90.0, 0.0, 5).1, 0);
    }

    #[test]
    fn test_tile_bounds_contain_their_points() {
        let point = LatLng::new(47.45, -122.31);
        for z in [3u8, 10, 16, 20] {
            let tile = TileCoord::from_lat_lng(&point, z);
            assert!(tile.planar_bounds().contains(&point.to_planar()), "zoom {z}");
        }
    }

    #[test]
    fn test_high_zoom_neighbours_stay_distinct() {
        let a = TileCoord::from_lat_lng(&LatLng::new(47.0, 8.0), 20);
        let b = TileCoord::from_lat_lng(&LatLng::new(47.0, 8.0 + 360.0 / 2_f64.powi(20)), 20);
        assert_eq!(b.x, a.x + 1);
    }

    #[test]
    fn test_flipped_row() {
        let coord = TileCoord::new(3, 0, 3);
        assert_eq!(coord.flipped_row(), 7);
        assert_eq!(TileCoord::new(0, 7, 3).flipped_row(), 0);
    }

    #[test]
    fn test_zoom_for_half_range_is_bounded() {
        let zoom = zoom_for_half_range_nm(20.0, 400.0, 47.0, 256.0, 3, 14);
        assert!((3..=14).contains(&zoom));
        assert_eq!(zoom_for_half_range_nm(20_000.0, 400.0, 0.0, 256.0, 3, 14), 3);
        assert_eq!(zoom_for_half_range_nm(0.001, 400.0, 0.0, 256.0, 3, 14), 14);
    }

    #[test]
    fn test_zoom_for_half_range_fits_range() {
        let zoom = zoom_for_half_range_nm(20.0, 400.0, 0.0, 256.0, 0, 20);
        let shown_m = meters_per_pixel(zoom, 256.0) * 400.0;
        assert!(shown_m >= 20.0 * METERS_PER_NM);
        let tighter_m = meters_per_pixel(zoom + 1, 256.0) * 400.0;
        assert!(tighter_m < 20.0 * METERS_PER_NM);
    }
}
