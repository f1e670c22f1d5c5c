//! The fixed set of tile basemaps the dashboard can display.
//!
//! Names follow the identifiers users already know from the dropdowns
//! (`OpenStreetMap`, `TERRAIN`, `Esri.WorldImagery`, ...). Anything outside
//! this set is rejected with [`MapError::UnknownBasemap`].

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::MapError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Basemap {
    OpenStreetMap,
    OpenTopoMap,
    Roadmap,
    Satellite,
    Terrain,
    Hybrid,
    EsriWorldImagery,
    EsriWorldTopoMap,
    EsriNatGeoWorldMap,
    CartoDbPositron,
    CartoDbDarkMatter,
}

impl Basemap {
    /// Every supported basemap, in dropdown order.
    pub const ALL: [Basemap; 11] = [
        Basemap::OpenStreetMap,
        Basemap::OpenTopoMap,
        Basemap::Roadmap,
        Basemap::Satellite,
        Basemap::Terrain,
        Basemap::Hybrid,
        Basemap::EsriWorldImagery,
        Basemap::EsriWorldTopoMap,
        Basemap::EsriNatGeoWorldMap,
        Basemap::CartoDbPositron,
        Basemap::CartoDbDarkMatter,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Basemap::OpenStreetMap => "OpenStreetMap",
            Basemap::OpenTopoMap => "OpenTopoMap",
            Basemap::Roadmap => "ROADMAP",
            Basemap::Satellite => "SATELLITE",
            Basemap::Terrain => "TERRAIN",
            Basemap::Hybrid => "HYBRID",
            Basemap::EsriWorldImagery => "Esri.WorldImagery",
            Basemap::EsriWorldTopoMap => "Esri.WorldTopoMap",
            Basemap::EsriNatGeoWorldMap => "Esri.NatGeoWorldMap",
            Basemap::CartoDbPositron => "CartoDB.Positron",
            Basemap::CartoDbDarkMatter => "CartoDB.DarkMatter",
        }
    }

    /// Leaflet tile URL template.
    pub fn tile_url(self) -> &'static str {
        match self {
            Basemap::OpenStreetMap => "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png",
            Basemap::OpenTopoMap => "https://{s}.tile.opentopomap.org/{z}/{x}/{y}.png",
            Basemap::Roadmap => "https://mt1.google.com/vt/lyrs=m&x={x}&y={y}&z={z}",
            Basemap::Satellite => "https://mt1.google.com/vt/lyrs=s&x={x}&y={y}&z={z}",
            Basemap::Terrain => "https://mt1.google.com/vt/lyrs=p&x={x}&y={y}&z={z}",
            Basemap::Hybrid => "https://mt1.google.com/vt/lyrs=y&x={x}&y={y}&z={z}",
            Basemap::EsriWorldImagery => {
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Imagery/MapServer/tile/{z}/{y}/{x}"
            }
            Basemap::EsriWorldTopoMap => {
                "https://server.arcgisonline.com/ArcGIS/rest/services/World_Topo_Map/MapServer/tile/{z}/{y}/{x}"
            }
            Basemap::EsriNatGeoWorldMap => {
                "https://server.arcgisonline.com/ArcGIS/rest/services/NatGeo_World_Map/MapServer/tile/{z}/{y}/{x}"
            }
            Basemap::CartoDbPositron => "https://{s}.basemaps.cartocdn.com/light_all/{z}/{x}/{y}.png",
            Basemap::CartoDbDarkMatter => "https://{s}.basemaps.cartocdn.com/dark_all/{z}/{x}/{y}.png",
        }
    }

    pub fn attribution(self) -> &'static str {
        match self {
            Basemap::OpenStreetMap => "&copy; OpenStreetMap contributors",
            Basemap::OpenTopoMap => "&copy; OpenStreetMap contributors, SRTM | &copy; OpenTopoMap (CC-BY-SA)",
            Basemap::Roadmap | Basemap::Satellite | Basemap::Terrain | Basemap::Hybrid => "Google",
            Basemap::EsriWorldImagery => "Tiles &copy; Esri, Maxar, Earthstar Geographics",
            Basemap::EsriWorldTopoMap => "Tiles &copy; Esri",
            Basemap::EsriNatGeoWorldMap => "Tiles &copy; Esri, National Geographic",
            Basemap::CartoDbPositron | Basemap::CartoDbDarkMatter => {
                "&copy; OpenStreetMap contributors &copy; CARTO"
            }
        }
    }

    pub fn max_zoom(self) -> u8 {
        match self {
            Basemap::OpenTopoMap => 17,
            Basemap::EsriNatGeoWorldMap => 16,
            Basemap::Roadmap | Basemap::Satellite | Basemap::Terrain | Basemap::Hybrid => 22,
            _ => 19,
        }
    }
}

impl FromStr for Basemap {
    type Err = MapError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        Basemap::ALL
            .iter()
            .find(|b| b.id() == name)
            .or_else(|| Basemap::ALL.iter().find(|b| b.id().eq_ignore_ascii_case(name)))
            .copied()
            .ok_or_else(|| MapError::UnknownBasemap(s.to_string()))
    }
}

impl fmt::Display for Basemap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl Serialize for Basemap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}
