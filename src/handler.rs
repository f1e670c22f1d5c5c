//! Turns one UI action into at most one rendered map document.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::MapError;
use crate::map::MapBuilder;
use crate::models::{MapParams, Trigger};
use crate::render::{Document, Renderer};

pub const ARTIFACT_NAME: &str = "map.html";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Update {
    Document(Document),
    NoUpdate,
}

pub struct MapHandler {
    builder: MapBuilder,
    renderer: Renderer,
    work_dir: PathBuf,
}

impl MapHandler {
    pub fn new(builder: MapBuilder, renderer: Renderer, work_dir: PathBuf) -> Result<Self, MapError> {
        if !work_dir.exists() {
            fs::create_dir_all(&work_dir)?;
        }
        Ok(Self {
            builder,
            renderer,
            work_dir,
        })
    }

    /// Path of the last written document.
    pub fn artifact_path(&self) -> PathBuf {
        self.work_dir.join(ARTIFACT_NAME)
    }

    /// Render and store the document for an empty map.
    pub fn initialize(&self) -> Result<Document, MapError> {
        let doc = self.renderer.render(&self.builder.empty())?;
        self.store(&doc)?;
        info!("initial map written to {}", self.artifact_path().display());
        Ok(doc)
    }

    pub fn handle(&self, trigger: Option<Trigger>, params: &MapParams) -> Result<Update, MapError> {
        let Some(trigger) = trigger.filter(|t| is_active(*t, params)) else {
            debug!("no active trigger, nothing to update");
            return Ok(Update::NoUpdate);
        };

        let map = self.builder.build(trigger, params)?;
        let doc = self.renderer.render(&map)?;
        self.store(&doc)?;
        debug!("{} rendered {} layer(s)", trigger, map.layers().len());
        Ok(Update::Document(doc))
    }

    /// The last stored document, if any has been written yet.
    pub fn last_document(&self) -> Result<Option<String>, MapError> {
        match fs::read_to_string(self.artifact_path()) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn store(&self, doc: &Document) -> Result<(), MapError> {
        write_atomic(&self.work_dir, &self.artifact_path(), doc.as_str())
    }
}

/// A button trigger needs a non-zero click count; an upload needs contents.
fn is_active(trigger: Trigger, params: &MapParams) -> bool {
    match trigger {
        Trigger::ApplyBasemap | Trigger::ApplySplit => params.n_clicks.unwrap_or(0) > 0,
        Trigger::UploadFile => params.upload.is_some(),
    }
}

fn write_atomic(dir: &Path, dest: &Path, contents: &str) -> Result<(), MapError> {
    let mut tmp = tempfile::Builder::new().prefix(".map-").suffix(".html").tempfile_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.persist(dest).map_err(|e| MapError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MapView;
    use crate::template_engine::TemplateEngine;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn handler(dir: &TempDir) -> MapHandler {
        let scratch = dir.path().join("scratch");
        fs::create_dir_all(&scratch).unwrap();
        MapHandler::new(
            MapBuilder::new(MapView::default(), scratch),
            Renderer::new(Arc::new(TemplateEngine::builtin().unwrap())),
            dir.path().join("work"),
        )
        .unwrap()
    }

    #[test]
    fn no_trigger_means_no_update() {
        let dir = TempDir::new().unwrap();
        let h = handler(&dir);
        let params = MapParams {
            n_clicks: Some(3),
            basemap: Some("OpenStreetMap".into()),
            ..Default::default()
        };
        assert_eq!(h.handle(None, &params).unwrap(), Update::NoUpdate);
        assert!(h.last_document().unwrap().is_none());
    }

    #[test]
    fn zero_clicks_means_no_update() {
        let dir = TempDir::new().unwrap();
        let h = handler(&dir);
        let params = MapParams {
            n_clicks: Some(0),
            basemap: Some("OpenStreetMap".into()),
            ..Default::default()
        };
        assert_eq!(h.handle(Some(Trigger::ApplyBasemap), &params).unwrap(), Update::NoUpdate);
        let params = MapParams::default();
        assert_eq!(h.handle(Some(Trigger::ApplySplit), &params).unwrap(), Update::NoUpdate);
        assert_eq!(h.handle(Some(Trigger::UploadFile), &params).unwrap(), Update::NoUpdate);
    }

    #[test]
    fn document_is_stored_and_overwritten() {
        let dir = TempDir::new().unwrap();
        let h = handler(&dir);
        let first = h.initialize().unwrap();
        assert_eq!(h.last_document().unwrap().as_deref(), Some(first.as_str()));

        let params = MapParams {
            n_clicks: Some(1),
            basemap: Some("SATELLITE".into()),
            ..Default::default()
        };
        let Update::Document(doc) = h.handle(Some(Trigger::ApplyBasemap), &params).unwrap() else {
            panic!("expected a document");
        };
        assert_ne!(doc, first);
        assert_eq!(h.last_document().unwrap().as_deref(), Some(doc.as_str()));
        // only the artifact remains in the work dir
        assert_eq!(fs::read_dir(dir.path().join("work")).unwrap().count(), 1);
    }

    #[test]
    fn failed_update_keeps_previous_document() {
        let dir = TempDir::new().unwrap();
        let h = handler(&dir);
        let first = h.initialize().unwrap();
        let params = MapParams {
            n_clicks: Some(1),
            basemap: Some("Nowhere".into()),
            ..Default::default()
        };
        assert!(matches!(
            h.handle(Some(Trigger::ApplyBasemap), &params),
            Err(MapError::UnknownBasemap(_))
        ));
        assert_eq!(h.last_document().unwrap().as_deref(), Some(first.as_str()));
    }
}
