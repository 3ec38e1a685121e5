//! Mapbox Vector Tile payload decoding
//!
//! Payloads are protobuf messages, optionally gzip-wrapped. Decoding yields a
//! plain layer/feature model with tags resolved to strings and geometry
//! commands expanded into integer paths in tile-extent coordinates.

use crate::constants::DEFAULT_TILE_EXTENT;
use crate::prelude::HashMap;
use crate::{MapError, Result};
use flate2::read::GzDecoder;
use prost::Message;
use std::io::Read;

/// Largest inflated payload accepted from a gzip-wrapped tile
pub const MAX_INFLATED_BYTES: u64 = 16 * 1024 * 1024;

const CMD_MOVE_TO: u32 = 1;
const CMD_LINE_TO: u32 = 2;
const CMD_CLOSE_PATH: u32 = 7;

#[derive(Clone, PartialEq, Message)]
pub struct ProtoTile {
    #[prost(message, repeated, tag = "3")]
    pub layers: Vec<ProtoLayer>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoLayer {
    #[prost(string, required, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub features: Vec<ProtoFeature>,
    #[prost(string, repeated, tag = "3")]
    pub keys: Vec<String>,
    #[prost(message, repeated, tag = "4")]
    pub values: Vec<ProtoValue>,
    #[prost(uint32, optional, tag = "5")]
    pub extent: Option<u32>,
    #[prost(uint32, required, tag = "15")]
    pub version: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoFeature {
    #[prost(uint64, optional, tag = "1")]
    pub id: Option<u64>,
    #[prost(uint32, repeated, tag = "2")]
    pub tags: Vec<u32>,
    #[prost(enumeration = "GeometryType", optional, tag = "3")]
    pub geometry_type: Option<i32>,
    #[prost(uint32, repeated, tag = "4")]
    pub geometry: Vec<u32>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProtoValue {
    #[prost(string, optional, tag = "1")]
    pub string_value: Option<String>,
    #[prost(float, optional, tag = "2")]
    pub float_value: Option<f32>,
    #[prost(double, optional, tag = "3")]
    pub double_value: Option<f64>,
    #[prost(int64, optional, tag = "4")]
    pub int_value: Option<i64>,
    #[prost(uint64, optional, tag = "5")]
    pub uint_value: Option<u64>,
    #[prost(sint64, optional, tag = "6")]
    pub sint_value: Option<i64>,
    #[prost(bool, optional, tag = "7")]
    pub bool_value: Option<bool>,
}

impl ProtoValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self {
            string_value: Some(value.into()),
            ..Self::default()
        }
    }

    fn to_tag_string(&self) -> String {
        if let Some(v) = &self.string_value {
            return v.clone();
        }
        if let Some(v) = self.bool_value {
            return v.to_string();
        }
        if let Some(v) = self.int_value.or(self.sint_value) {
            return v.to_string();
        }
        if let Some(v) = self.uint_value {
            return v.to_string();
        }
        if let Some(v) = self.double_value {
            return v.to_string();
        }
        if let Some(v) = self.float_value {
            return v.to_string();
        }
        String::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, prost::Enumeration)]
#[repr(i32)]
pub enum GeometryType {
    Unknown = 0,
    Point = 1,
    LineString = 2,
    Polygon = 3,
}

/// One decoded layer
#[derive(Debug, Clone, PartialEq)]
pub struct VectorLayer {
    pub name: String,
    pub extent: u32,
    pub features: Vec<VectorFeature>,
}

/// One decoded feature. Paths hold absolute tile-extent coordinates; polygon
/// rings repeat their first vertex at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFeature {
    pub id: Option<u64>,
    pub geometry_type: GeometryType,
    pub properties: HashMap<String, String>,
    pub paths: Vec<Vec<(i32, i32)>>,
}

impl VectorFeature {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Whether the payload starts with the gzip magic bytes
pub fn is_gzipped(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x1f && bytes[1] == 0x8b
}

/// Decodes a tile payload into layers
pub fn decode_tile(bytes: &[u8]) -> Result<Vec<VectorLayer>> {
    let tile = if is_gzipped(bytes) {
        let inflated = inflate(bytes, MAX_INFLATED_BYTES)?;
        ProtoTile::decode(inflated.as_slice())
    } else {
        ProtoTile::decode(bytes)
    }
    .map_err(|e| MapError::Decode(e.to_string()))?;

    Ok(tile.layers.iter().map(convert_layer).collect())
}

/// Gunzips `bytes`, failing once the output would exceed `limit` bytes
fn inflate(bytes: &[u8], limit: u64) -> Result<Vec<u8>> {
    let mut inflated = Vec::with_capacity(bytes.len() * 4);
    // One byte past the limit tells an oversized payload from one that fits exactly
    GzDecoder::new(bytes)
        .take(limit + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| MapError::Decode(format!("gzip: {e}")))?;
    if inflated.len() as u64 > limit {
        return Err(MapError::Decode(format!(
            "gzip payload inflates past {limit} bytes"
        )));
    }
    Ok(inflated)
}

fn convert_layer(layer: &ProtoLayer) -> VectorLayer {
    let features = layer
        .features
        .iter()
        .map(|feature| VectorFeature {
            id: feature.id,
            geometry_type: feature
                .geometry_type
                .and_then(|raw| GeometryType::try_from(raw).ok())
                .unwrap_or(GeometryType::Unknown),
            properties: decode_tags(layer, feature),
            paths: decode_paths(&feature.geometry),
        })
        .collect();

    VectorLayer {
        name: layer.name.clone(),
        extent: layer.extent.filter(|e| *e > 0).unwrap_or(DEFAULT_TILE_EXTENT),
        features,
    }
}

fn decode_tags(layer: &ProtoLayer, feature: &ProtoFeature) -> HashMap<String, String> {
    let mut tags = HashMap::default();
    for pair in feature.tags.chunks_exact(2) {
        let Some(key) = layer.keys.get(pair[0] as usize) else {
            continue;
        };
        let Some(value) = layer.values.get(pair[1] as usize) else {
            continue;
        };
        tags.insert(key.clone(), value.to_tag_string());
    }
    tags
}

/// Expands a geometry command stream into paths.
///
/// A command whose parameters run past the end of the stream, or an unknown
/// command id, ends decoding; everything decoded up to that point is kept.
pub fn decode_paths(commands: &[u32]) -> Vec<Vec<(i32, i32)>> {
    let mut paths = Vec::new();
    let mut path: Vec<(i32, i32)> = Vec::new();
    let mut cursor = 0usize;
    let (mut x, mut y) = (0i32, 0i32);

    'stream: while cursor < commands.len() {
        let command = commands[cursor];
        cursor += 1;
        let id = command & 0x7;
        let count = command >> 3;

        match id {
            CMD_MOVE_TO | CMD_LINE_TO => {
                for _ in 0..count {
                    if cursor + 1 >= commands.len() {
                        break 'stream;
                    }
                    x = x.wrapping_add(decode_zigzag(commands[cursor]));
                    y = y.wrapping_add(decode_zigzag(commands[cursor + 1]));
                    cursor += 2;
                    if id == CMD_MOVE_TO && !path.is_empty() {
                        paths.push(std::mem::take(&mut path));
                    }
                    path.push((x, y));
                }
            }
            CMD_CLOSE_PATH => {
                if let Some(first) = path.first().copied() {
                    path.push(first);
                }
            }
            _ => break,
        }
    }
    if !path.is_empty() {
        paths.push(path);
    }
    paths
}

fn decode_zigzag(value: u32) -> i32 {
    ((value >> 1) as i32) ^ -((value & 1) as i32)
}

fn encode_zigzag(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

fn command(id: u32, count: u32) -> u32 {
    (count << 3) | (id & 0x7)
}

/// Encodes paths as a geometry command stream, closing each one when `close` is set
pub fn encode_paths(paths: &[Vec<(i32, i32)>], close: bool) -> Vec<u32> {
    let mut out = Vec::new();
    let (mut cx, mut cy) = (0i32, 0i32);
    for path in paths {
        let Some((&first, rest)) = path.split_first() else {
            continue;
        };
        out.push(command(CMD_MOVE_TO, 1));
        out.push(encode_zigzag(first.0 - cx));
        out.push(encode_zigzag(first.1 - cy));
        (cx, cy) = first;

        if !rest.is_empty() {
            out.push(command(CMD_LINE_TO, rest.len() as u32));
            for &(px, py) in rest {
                out.push(encode_zigzag(px - cx));
                out.push(encode_zigzag(py - cy));
                (cx, cy) = (px, py);
            }
        }
        if close {
            out.push(command(CMD_CLOSE_PATH, 1));
        }
    }
    out
}

/// Assembles vector-tile payloads, for tests and synthetic data
#[derive(Debug, Default, Clone)]
pub struct VectorTileBuilder {
    tile: ProtoTile,
}

impl VectorTileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn layer_mut(&mut self, name: &str) -> &mut ProtoLayer {
        let index = match self.tile.layers.iter().position(|l| l.name == name) {
            Some(index) => index,
            None => {
                self.tile.layers.push(ProtoLayer {
                    name: name.to_string(),
                    extent: Some(DEFAULT_TILE_EXTENT),
                    version: 2,
                    ..ProtoLayer::default()
                });
                self.tile.layers.len() - 1
            }
        };
        &mut self.tile.layers[index]
    }

    /// Adds a feature to the named layer, creating the layer on first use.
    /// Polygon rings are written without the closing vertex and closed by command.
    pub fn feature(
        mut self,
        layer: &str,
        geometry_type: GeometryType,
        tags: &[(&str, &str)],
        paths: Vec<Vec<(i32, i32)>>,
    ) -> Self {
        let layer = self.layer_mut(layer);
        let mut encoded_tags = Vec::with_capacity(tags.len() * 2);
        for (key, value) in tags {
            let key_index = match layer.keys.iter().position(|k| k == key) {
                Some(i) => i,
                None => {
                    layer.keys.push(key.to_string());
                    layer.keys.len() - 1
                }
            };
            let value = ProtoValue::string(*value);
            let value_index = match layer.values.iter().position(|v| *v == value) {
                Some(i) => i,
                None => {
                    layer.values.push(value);
                    layer.values.len() - 1
                }
            };
            encoded_tags.push(key_index as u32);
            encoded_tags.push(value_index as u32);
        }

        let id = layer.features.len() as u64 + 1;
        layer.features.push(ProtoFeature {
            id: Some(id),
            tags: encoded_tags,
            geometry_type: Some(geometry_type as i32),
            geometry: encode_paths(&paths, geometry_type == GeometryType::Polygon),
        });
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.tile.encode_to_vec()
    }

    /// Encoded payload wrapped in gzip, as MBTiles archives usually store it
    pub fn build_gzipped(&self) -> Result<Vec<u8>> {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&self.build())?;
        Ok(encoder.finish()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(min: i32, max: i32) -> Vec<(i32, i32)> {
        vec![(min, min), (max, min), (max, max), (min, max)]
    }

    #[test]
    fn test_zigzag() {
        for value in [0, 1, -1, 2, -2, 4095, -4096, i32::MAX, i32::MIN] {
            assert_eq!(decode_zigzag(encode_zigzag(value)), value);
        }
        assert_eq!(decode_zigzag(3), -2);
    }

    #[test]
    fn test_decode_reference_polygon() {
        // Polygon from the vector tile format documentation
        let commands = [9, 6, 12, 18, 10, 12, 24, 44, 15];
        let paths = decode_paths(&commands);
        assert_eq!(paths, vec![vec![(3, 6), (8, 12), (20, 34), (3, 6)]]);
    }

    #[test]
    fn test_decode_multi_linestring() {
        let commands = [9, 4, 4, 18, 0, 16, 16, 0, 9, 17, 17, 10, 4, 8];
        let paths = decode_paths(&commands);
        assert_eq!(
            paths,
            vec![vec![(2, 2), (2, 10), (10, 10)], vec![(1, 1), (3, 5)]]
        );
    }

    #[test]
    fn test_truncated_commands_keep_prefix() {
        // LineTo claims two points but the stream ends after one
        let commands = [9, 4, 4, 18, 0, 16];
        assert_eq!(decode_paths(&commands), vec![vec![(2, 2), (2, 10)]]);
        assert!(decode_paths(&[]).is_empty());
        assert!(decode_paths(&[9]).is_empty());
    }

    #[test]
    fn test_builder_decodes_back() {
        let bytes = VectorTileBuilder::new()
            .feature("water", GeometryType::Polygon, &[("class", "lake")], vec![square(0, 4096)])
            .feature(
                "transportation",
                GeometryType::LineString,
                &[("class", "primary")],
                vec![vec![(0, 2048), (4096, 2048)]],
            )
            .build();

        let layers = decode_tile(&bytes).unwrap();
        assert_eq!(layers.len(), 2);
        let water = &layers[0];
        assert_eq!(water.name, "water");
        assert_eq!(water.extent, 4096);
        assert_eq!(water.features[0].geometry_type, GeometryType::Polygon);
        assert_eq!(water.features[0].property("class"), Some("lake"));
        assert_eq!(water.features[0].paths[0].len(), 5);
        assert_eq!(layers[1].features[0].paths[0], vec![(0, 2048), (4096, 2048)]);
    }

    #[test]
    fn test_gzipped_payload() {
        let builder = VectorTileBuilder::new().feature(
            "building",
            GeometryType::Polygon,
            &[],
            vec![square(10, 20)],
        );
        let gz = builder.build_gzipped().unwrap();
        assert!(is_gzipped(&gz));
        let layers = decode_tile(&gz).unwrap();
        assert_eq!(layers[0].name, "building");
    }

    #[test]
    fn test_inflation_is_bounded() {
        let gz = VectorTileBuilder::new()
            .feature("water", GeometryType::Polygon, &[], vec![vec![(0, 0), (10, 0), (10, 10)]])
            .build_gzipped()
            .unwrap();
        let size = inflate(&gz, MAX_INFLATED_BYTES).unwrap().len() as u64;
        assert_eq!(inflate(&gz, size).unwrap().len() as u64, size);
        assert!(matches!(inflate(&gz, size - 1), Err(MapError::Decode(_))));
    }

    #[test]
    fn test_zero_bomb_rejected() {
        use flate2::write::GzEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
        let zeros = vec![0u8; 1 << 20];
        for _ in 0..(MAX_INFLATED_BYTES >> 20) + 1 {
            encoder.write_all(&zeros).unwrap();
        }
        let bomb = encoder.finish().unwrap();
        assert!(bomb.len() < 1 << 20);
        assert!(decode_tile(&bomb).is_err());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(decode_tile(&[0xff, 0xff, 0xff, 0xff]).is_err());
        assert!(decode_tile(&[0x1f, 0x8b, 0x00]).is_err());
    }

    #[test]
    fn test_non_string_values() {
        let layer = ProtoLayer {
            name: "poi".into(),
            keys: vec!["rank".into(), "open".into()],
            values: vec![
                ProtoValue {
                    int_value: Some(7),
                    ..ProtoValue::default()
                },
                ProtoValue {
                    bool_value: Some(true),
                    ..ProtoValue::default()
                },
            ],
            version: 2,
            ..ProtoLayer::default()
        };
        let feature = ProtoFeature {
            tags: vec![0, 0, 1, 1, 5],
            ..ProtoFeature::default()
        };
        let tags = decode_tags(&layer, &feature);
        assert_eq!(tags.get("rank").map(String::as_str), Some("7"));
        assert_eq!(tags.get("open").map(String::as_str), Some("true"));
        assert_eq!(tags.len(), 2);
    }
}
