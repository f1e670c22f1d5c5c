//! Map values and the builder that applies one mutation per request.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::basemap::Basemap;
use crate::error::MapError;
use crate::models::{MapParams, Trigger};
use crate::upload::{self, UploadKind, VectorLayer};

/// Initial center and zoom of every fresh map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapView {
    /// `[lat, lon]`
    pub center: [f64; 2],
    pub zoom: u8,
}

impl Default for MapView {
    fn default() -> Self {
        Self {
            center: [20.0, 0.0],
            zoom: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SplitView {
    pub left: Basemap,
    pub right: Basemap,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SplitFailure {
    #[error("unknown split layer: {0}")]
    UnknownLayer(String),
    #[error("left and right layers are both {0}")]
    IdenticalLayers(Basemap),
}

impl SplitView {
    pub fn configure(left: &str, right: &str) -> Result<SplitView, SplitFailure> {
        let left: Basemap = left
            .parse()
            .map_err(|_| SplitFailure::UnknownLayer(left.to_string()))?;
        let right: Basemap = right
            .parse()
            .map_err(|_| SplitFailure::UnknownLayer(right.to_string()))?;
        if left == right {
            return Err(SplitFailure::IdenticalLayers(left));
        }
        Ok(SplitView { left, right })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Layer {
    Basemap { basemap: Basemap },
    Split(SplitView),
    Vector(VectorLayer),
}

impl Layer {
    pub fn name(&self) -> String {
        match self {
            Layer::Basemap { basemap } => basemap.id().to_string(),
            Layer::Split(split) => format!("{} | {}", split.left, split.right),
            Layer::Vector(v) => v.name.clone(),
        }
    }

    fn is_tiles(&self) -> bool {
        !matches!(self, Layer::Vector(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapValue {
    pub view: MapView,
    layers: Vec<Layer>,
}

impl MapValue {
    pub fn new(view: MapView) -> Self {
        Self {
            view,
            layers: Vec::new(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn add_basemap(&mut self, basemap: Basemap) {
        self.layers.push(Layer::Basemap { basemap });
    }

    pub fn add_split(&mut self, split: SplitView) {
        self.layers.push(Layer::Split(split));
    }

    pub fn add_vector(&mut self, layer: VectorLayer) {
        self.layers.push(Layer::Vector(layer));
    }

    /// Whether any layer draws tiles; without one the renderer supplies a background.
    pub fn has_tile_layer(&self) -> bool {
        self.layers.iter().any(Layer::is_tiles)
    }
}

/// Builds a fresh [`MapValue`] per request.
#[derive(Debug, Clone)]
pub struct MapBuilder {
    view: MapView,
    scratch_dir: PathBuf,
}

impl MapBuilder {
    pub fn new(view: MapView, scratch_dir: PathBuf) -> Self {
        Self { view, scratch_dir }
    }

    pub fn empty(&self) -> MapValue {
        MapValue::new(self.view)
    }

    pub fn build(&self, trigger: Trigger, params: &MapParams) -> Result<MapValue, MapError> {
        let mut map = self.empty();
        match trigger {
            Trigger::ApplyBasemap => {
                let name = params
                    .basemap
                    .as_deref()
                    .ok_or(MapError::MissingParameter("basemap"))?;
                map.add_basemap(name.parse()?);
            }
            Trigger::ApplySplit => {
                let left = params
                    .left_layer
                    .as_deref()
                    .ok_or(MapError::MissingParameter("left_layer"))?;
                let right = params
                    .right_layer
                    .as_deref()
                    .ok_or(MapError::MissingParameter("right_layer"))?;
                match SplitView::configure(left, right) {
                    Ok(split) => map.add_split(split),
                    Err(reason) => {
                        warn!("split map failed, falling back to {}: {}", left, reason);
                        map = self.empty();
                        map.add_basemap(left.parse()?);
                    }
                }
            }
            Trigger::UploadFile => {
                let upload = params
                    .upload
                    .as_ref()
                    .ok_or(MapError::MissingParameter("upload"))?;
                let kind = UploadKind::from_filename(&upload.filename)?;
                let name = upload::layer_name(&upload.filename);
                let staged = upload::stage(upload, kind, &self.scratch_dir)?;
                let layer = upload::load_layer(staged.path(), kind, &name)?;
                debug!("loaded layer {} from {}", name, upload.filename);
                map.add_vector(layer);
            }
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::{Upload, VectorSource};
    use tempfile::TempDir;

    fn builder(dir: &TempDir) -> MapBuilder {
        MapBuilder::new(MapView::default(), dir.path().to_path_buf())
    }

    fn basemap_params(name: &str) -> MapParams {
        MapParams {
            n_clicks: Some(1),
            basemap: Some(name.into()),
            ..Default::default()
        }
    }

    fn split_params(left: &str, right: &str) -> MapParams {
        MapParams {
            n_clicks: Some(1),
            left_layer: Some(left.into()),
            right_layer: Some(right.into()),
            ..Default::default()
        }
    }

    fn upload_params(filename: &str, bytes: &[u8]) -> MapParams {
        MapParams {
            upload: Some(Upload {
                filename: filename.into(),
                bytes: bytes.to_vec(),
            }),
            ..Default::default()
        }
    }

    const POINTS: &str = r#"{"type":"FeatureCollection","features":[
        {"type":"Feature","properties":{"name":"a"},"geometry":{"type":"Point","coordinates":[1.0,2.0]}},
        {"type":"Feature","properties":{"name":"b"},"geometry":{"type":"Point","coordinates":[3.0,4.0]}}]}"#;

    #[test]
    fn every_basemap_becomes_the_single_layer() {
        let dir = TempDir::new().unwrap();
        let b = builder(&dir);
        for basemap in Basemap::ALL {
            let map = b.build(Trigger::ApplyBasemap, &basemap_params(basemap.id())).unwrap();
            assert_eq!(map.layers(), &[Layer::Basemap { basemap }]);
        }
    }

    #[test]
    fn unknown_basemap_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = builder(&dir)
            .build(Trigger::ApplyBasemap, &basemap_params("Nope"))
            .unwrap_err();
        assert!(matches!(err, MapError::UnknownBasemap(ref n) if n == "Nope"));
    }

    #[test]
    fn missing_basemap_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = builder(&dir)
            .build(Trigger::ApplyBasemap, &MapParams::default())
            .unwrap_err();
        assert!(matches!(err, MapError::MissingParameter("basemap")));
    }

    #[test]
    fn split_configures_both_sides() {
        let dir = TempDir::new().unwrap();
        let map = builder(&dir)
            .build(Trigger::ApplySplit, &split_params("TERRAIN", "OpenTopoMap"))
            .unwrap();
        assert_eq!(
            map.layers(),
            &[Layer::Split(SplitView {
                left: Basemap::Terrain,
                right: Basemap::OpenTopoMap
            })]
        );
    }

    #[test]
    fn invalid_split_falls_back_to_left_layer() {
        let dir = TempDir::new().unwrap();
        let b = builder(&dir);

        let map = b.build(Trigger::ApplySplit, &split_params("TERRAIN", "TERRAIN")).unwrap();
        assert_eq!(map.layers(), &[Layer::Basemap { basemap: Basemap::Terrain }]);

        let map = b.build(Trigger::ApplySplit, &split_params("SATELLITE", "Mars")).unwrap();
        assert_eq!(map.layers(), &[Layer::Basemap { basemap: Basemap::Satellite }]);
    }

    #[test]
    fn fallback_needs_a_known_left_layer() {
        let dir = TempDir::new().unwrap();
        let err = builder(&dir)
            .build(Trigger::ApplySplit, &split_params("Mars", "OpenTopoMap"))
            .unwrap_err();
        assert!(matches!(err, MapError::UnknownBasemap(_)));
    }

    #[test]
    fn split_failure_reasons() {
        assert_eq!(
            SplitView::configure("OpenStreetMap", "OpenStreetMap"),
            Err(SplitFailure::IdenticalLayers(Basemap::OpenStreetMap))
        );
        assert_eq!(
            SplitView::configure("x", "OpenStreetMap"),
            Err(SplitFailure::UnknownLayer("x".into()))
        );
    }

    #[test]
    fn geojson_upload_adds_one_named_layer() {
        let dir = TempDir::new().unwrap();
        let map = builder(&dir)
            .build(Trigger::UploadFile, &upload_params("parks.geojson", POINTS.as_bytes()))
            .unwrap();
        assert_eq!(map.layers().len(), 1);
        match &map.layers()[0] {
            Layer::Vector(v) => {
                assert_eq!(v.name, "parks");
                assert!(matches!(v.source, VectorSource::GeoJson { feature_count: 2, .. }));
            }
            other => panic!("unexpected layer {:?}", other),
        }
        assert!(!map.has_tile_layer());
    }

    #[test]
    fn shapefile_upload_embeds_zip() {
        let dir = TempDir::new().unwrap();
        let map = builder(&dir)
            .build(Trigger::UploadFile, &upload_params("roads.shp", b"PK\x03\x04rest"))
            .unwrap();
        match &map.layers()[0] {
            Layer::Vector(v) => {
                assert_eq!(v.name, "roads");
                assert_eq!(
                    v.source,
                    VectorSource::Shapefile {
                        zip_base64: "UEsDBHJlc3Q=".into()
                    }
                );
            }
            other => panic!("unexpected layer {:?}", other),
        }
    }

    #[test]
    fn unsupported_upload_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = builder(&dir)
            .build(Trigger::UploadFile, &upload_params("points.csv", b"a,b"))
            .unwrap_err();
        assert!(matches!(err, MapError::UnsupportedFileType(_)));
    }

    #[test]
    fn scratch_dir_is_empty_after_every_upload() {
        let dir = TempDir::new().unwrap();
        let b = builder(&dir);
        b.build(Trigger::UploadFile, &upload_params("ok.geojson", POINTS.as_bytes()))
            .unwrap();
        let err = b
            .build(Trigger::UploadFile, &upload_params("broken.geojson", b"{not json"))
            .unwrap_err();
        assert!(matches!(err, MapError::InvalidGeoJson { .. }));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
