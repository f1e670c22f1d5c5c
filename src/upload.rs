//! Uploaded spatial files: data-URL decoding, temporary staging and loading
//! into a vector layer.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use geojson::GeoJson;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::MapError;

/// A decoded upload as handed to the map builder.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    GeoJson,
    /// Shapefile bundle packaged as a zip archive, named `.shp` or `.zip`.
    Shapefile,
}

impl UploadKind {
    pub fn from_filename(filename: &str) -> Result<Self, MapError> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("geojson") => Ok(UploadKind::GeoJson),
            Some("shp" | "zip") => Ok(UploadKind::Shapefile),
            _ => Err(MapError::UnsupportedFileType(filename.to_string())),
        }
    }

    fn staging_suffix(self) -> &'static str {
        match self {
            UploadKind::GeoJson => ".geojson",
            UploadKind::Shapefile => ".zip",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum VectorSource {
    GeoJson {
        data: serde_json::Value,
        feature_count: usize,
    },
    /// Zip bytes, base64 encoded, decoded client side.
    Shapefile { zip_base64: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorLayer {
    pub name: String,
    #[serde(flatten)]
    pub source: VectorSource,
}

/// Decode a browser data URL (`data:<mime>;base64,<payload>`).
///
/// Only the part after the first comma is decoded, so a bare base64 string
/// prefixed with `,` is accepted as well.
pub fn decode_data_url(contents: &str) -> Result<Vec<u8>, MapError> {
    let (_, payload) = contents
        .split_once(',')
        .ok_or_else(|| MapError::InvalidUpload("expected a data URL".into()))?;
    STANDARD
        .decode(payload.trim())
        .map_err(|e| MapError::InvalidUpload(format!("bad base64 payload: {}", e)))
}

/// Layer name for an uploaded file: the file name without its extension.
pub fn layer_name(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(filename)
        .to_string()
}

/// Write the upload to a temporary file inside `dir`.
///
/// The file is removed when the returned handle is dropped.
pub fn stage(upload: &Upload, kind: UploadKind, dir: &Path) -> Result<NamedTempFile, MapError> {
    let mut tmp = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(kind.staging_suffix())
        .tempfile_in(dir)?;
    tmp.write_all(&upload.bytes)?;
    tmp.flush()?;
    debug!("staged {} ({} bytes) at {}", upload.filename, upload.bytes.len(), tmp.path().display());
    Ok(tmp)
}

/// Read a staged file back as a named vector layer.
pub fn load_layer(path: &Path, kind: UploadKind, name: &str) -> Result<VectorLayer, MapError> {
    let source = match kind {
        UploadKind::GeoJson => {
            let text = fs::read_to_string(path).map_err(|e| MapError::InvalidGeoJson {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            let geojson = GeoJson::from_str(&text).map_err(|e| MapError::InvalidGeoJson {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            let feature_count = match &geojson {
                GeoJson::FeatureCollection(fc) => fc.features.len(),
                GeoJson::Feature(_) | GeoJson::Geometry(_) => 1,
            };
            let data = serde_json::to_value(&geojson).map_err(|e| MapError::InvalidGeoJson {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            VectorSource::GeoJson { data, feature_count }
        }
        UploadKind::Shapefile => {
            let bytes = fs::read(path)?;
            VectorSource::Shapefile {
                zip_base64: STANDARD.encode(bytes),
            }
        }
    };
    Ok(VectorLayer {
        name: name.to_string(),
        source,
    })
}
