//! Serializes a [`MapValue`] into a self-contained Leaflet page.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use crate::basemap::Basemap;
use crate::error::MapError;
use crate::map::{Layer, MapValue, MapView};
use crate::template_engine::{script_json, TemplateEngine};

const SPEC_OPEN: &str = r#"<script type="application/json" id="map-spec">"#;

/// Tiles drawn when a map has no tile layer of its own.
pub const BACKGROUND: Basemap = Basemap::OpenStreetMap;

/// A rendered map page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document(String);

impl Document {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// The embedded machine-readable map description.
    pub fn spec(&self) -> Option<serde_json::Value> {
        let start = self.0.find(SPEC_OPEN)? + SPEC_OPEN.len();
        let len = self.0[start..].find("</script>")?;
        serde_json::from_str(&self.0[start..start + len]).ok()
    }
}

impl From<String> for Document {
    fn from(html: String) -> Self {
        Document(html)
    }
}

#[derive(Serialize)]
struct TileSpec {
    url: &'static str,
    attribution: &'static str,
    max_zoom: u8,
}

#[derive(Serialize)]
struct MapSpec<'a> {
    view: MapView,
    background: Option<Basemap>,
    layers: &'a [Layer],
    tiles: BTreeMap<&'static str, TileSpec>,
}

impl<'a> MapSpec<'a> {
    fn from_map(map: &'a MapValue) -> Self {
        let background = (!map.has_tile_layer()).then_some(BACKGROUND);
        let mut used: Vec<Basemap> = background.into_iter().collect();
        for layer in map.layers() {
            match layer {
                Layer::Basemap { basemap } => used.push(*basemap),
                Layer::Split(split) => used.extend([split.left, split.right]),
                Layer::Vector(_) => {}
            }
        }
        let tiles = used
            .into_iter()
            .map(|b| {
                (
                    b.id(),
                    TileSpec {
                        url: b.tile_url(),
                        attribution: b.attribution(),
                        max_zoom: b.max_zoom(),
                    },
                )
            })
            .collect();
        Self {
            view: map.view,
            background,
            layers: map.layers(),
            tiles,
        }
    }
}

#[derive(Clone)]
pub struct Renderer {
    templates: Arc<TemplateEngine>,
}

impl Renderer {
    pub fn new(templates: Arc<TemplateEngine>) -> Self {
        Self { templates }
    }

    pub fn render(&self, map: &MapValue) -> Result<Document, MapError> {
        let spec = MapSpec::from_map(map);
        let names: Vec<String> = map.layers().iter().map(Layer::name).collect();
        let mut ctx = tera::Context::new();
        ctx.insert("title", &title(&names));
        ctx.insert("layer_names", &names);
        ctx.insert("has_split", &map.layers().iter().any(|l| matches!(l, Layer::Split(_))));
        ctx.insert("has_shapefile", &map.layers().iter().any(is_shapefile));
        ctx.insert("map_spec", &script_json(&spec)?);
        self.templates.render("map.html", &ctx).map(Document)
    }
}

fn is_shapefile(layer: &Layer) -> bool {
    matches!(
        layer,
        Layer::Vector(v) if matches!(v.source, crate::upload::VectorSource::Shapefile { .. })
    )
}

fn title(names: &[String]) -> String {
    if names.is_empty() {
        "Map".to_string()
    } else {
        format!("Map: {}", names.join(", "))
    }
}
