//! Colour table for vector tile features
//!
//! Styles are looked up by layer name, then by the feature's `class` property,
//! falling back to the layer default. Unknown layers are skipped.

use crate::prelude::HashMap;
use once_cell::sync::Lazy;

pub type Rgba = [u8; 4];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineStyle {
    pub color: Rgba,
    /// Stroke width in pixels of a 512 px raster
    pub width: f32,
}

/// How a feature is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureStyle {
    Skip,
    /// Polygons use `fill`, lines use `line`; a missing entry skips that geometry
    Paint {
        fill: Option<Rgba>,
        line: Option<LineStyle>,
    },
}

impl FeatureStyle {
    const fn fill(color: Rgba) -> Self {
        Self::Paint {
            fill: Some(color),
            line: None,
        }
    }

    const fn line(color: Rgba, width: f32) -> Self {
        Self::Paint {
            fill: None,
            line: Some(LineStyle { color, width }),
        }
    }

    const fn both(fill: Rgba, line: Rgba, width: f32) -> Self {
        Self::Paint {
            fill: Some(fill),
            line: Some(LineStyle { color: line, width }),
        }
    }
}

struct LayerRules {
    /// Draw order; lower ranks are painted first
    rank: u8,
    default: FeatureStyle,
    classes: HashMap<&'static str, FeatureStyle>,
}

impl LayerRules {
    fn new(rank: u8, default: FeatureStyle, classes: &[(&'static str, FeatureStyle)]) -> Self {
        Self {
            rank,
            default,
            classes: classes.iter().copied().collect(),
        }
    }
}

const WATER: Rgba = [170, 211, 223, 255];
const ROAD: Rgba = [190, 190, 190, 255];
const MAJOR_ROAD: Rgba = [160, 160, 160, 255];
const AEROWAY: Rgba = [187, 187, 204, 255];

static LAYERS: Lazy<HashMap<&'static str, LayerRules>> = Lazy::new(|| {
    use FeatureStyle as S;

    let mut layers = HashMap::default();
    layers.insert(
        "landcover",
        LayerRules::new(
            0,
            S::Skip,
            &[
                ("grass", S::fill([205, 235, 176, 255])),
                ("wood", S::fill([173, 209, 158, 255])),
                ("forest", S::fill([173, 209, 158, 255])),
                ("farmland", S::fill([238, 240, 213, 255])),
                ("wetland", S::fill([200, 225, 205, 255])),
                ("sand", S::fill([245, 233, 198, 255])),
                ("rock", S::fill([220, 218, 210, 255])),
                ("ice", S::fill([242, 250, 255, 255])),
            ],
        ),
    );
    layers.insert(
        "landuse",
        LayerRules::new(
            0,
            S::Skip,
            &[
                ("residential", S::fill([224, 223, 223, 255])),
                ("commercial", S::fill([230, 226, 226, 255])),
                ("industrial", S::fill([215, 212, 210, 255])),
                ("railway", S::fill([220, 216, 214, 255])),
                ("cemetery", S::fill([170, 203, 175, 255])),
                ("pitch", S::fill([170, 224, 203, 255])),
                ("stadium", S::fill([170, 224, 203, 255])),
            ],
        ),
    );
    layers.insert("park", LayerRules::new(1, S::fill([200, 240, 196, 255]), &[]));
    layers.insert("water", LayerRules::new(2, S::fill(WATER), &[]));
    layers.insert(
        "waterway",
        LayerRules::new(
            2,
            S::line(WATER, 1.5),
            &[
                ("river", S::line(WATER, 3.0)),
                ("canal", S::line(WATER, 2.0)),
                ("ditch", S::Skip),
                ("drain", S::Skip),
            ],
        ),
    );
    layers.insert(
        "aeroway",
        LayerRules::new(
            3,
            S::both([223, 220, 230, 255], AEROWAY, 1.0),
            &[
                ("runway", S::both(AEROWAY, AEROWAY, 6.0)),
                ("taxiway", S::line(AEROWAY, 2.0)),
                ("heliport", S::Skip),
            ],
        ),
    );
    layers.insert("building", LayerRules::new(4, S::fill([217, 208, 201, 255]), &[]));
    layers.insert(
        "transportation",
        LayerRules::new(
            5,
            S::Skip,
            &[
                ("motorway", S::line(MAJOR_ROAD, 4.0)),
                ("trunk", S::line(MAJOR_ROAD, 3.5)),
                ("primary", S::line(MAJOR_ROAD, 3.0)),
                ("secondary", S::line(ROAD, 2.5)),
                ("tertiary", S::line(ROAD, 2.0)),
                ("minor", S::line(ROAD, 1.5)),
                ("service", S::line(ROAD, 1.0)),
                ("rail", S::line([150, 150, 150, 255], 1.0)),
                ("path", S::Skip),
                ("track", S::Skip),
            ],
        ),
    );
    layers
});

/// Style of a feature in `layer` with the given `class` property
pub fn style_for(layer: &str, class: Option<&str>) -> FeatureStyle {
    let Some(rules) = LAYERS.get(layer) else {
        return FeatureStyle::Skip;
    };
    class
        .and_then(|class| rules.classes.get(class).copied())
        .unwrap_or(rules.default)
}

/// Paint order of a layer, `None` for layers that are never drawn
pub fn layer_rank(layer: &str) -> Option<u8> {
    LAYERS.get(layer).map(|rules| rules.rank)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_lookup_and_fallback() {
        assert_eq!(style_for("water", None), FeatureStyle::fill(WATER));
        assert_eq!(style_for("water", Some("lake")), FeatureStyle::fill(WATER));
        assert_eq!(
            style_for("transportation", Some("motorway")),
            FeatureStyle::line(MAJOR_ROAD, 4.0)
        );
        assert_eq!(style_for("transportation", Some("unknown")), FeatureStyle::Skip);
        assert_eq!(style_for("transportation", None), FeatureStyle::Skip);
    }

    #[test]
    fn test_explicit_skip() {
        assert_eq!(style_for("waterway", Some("ditch")), FeatureStyle::Skip);
        assert_eq!(style_for("landcover", None), FeatureStyle::Skip);
    }

    #[test]
    fn test_unknown_layer_skipped() {
        assert_eq!(style_for("poi", Some("restaurant")), FeatureStyle::Skip);
        assert_eq!(layer_rank("poi"), None);
    }

    #[test]
    fn test_draw_order() {
        let rank = |name| layer_rank(name).unwrap();
        assert!(rank("landcover") < rank("water"));
        assert!(rank("landuse") < rank("park"));
        assert!(rank("water") < rank("building"));
        assert!(rank("building") < rank("transportation"));
        assert!(rank("aeroway") < rank("transportation"));
    }
}
