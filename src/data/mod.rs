pub mod mvt;

pub use mvt::{decode_tile, GeometryType, VectorFeature, VectorLayer, VectorTileBuilder};
