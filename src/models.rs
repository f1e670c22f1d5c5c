use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MapError;
use crate::upload::{self, Upload};

/// UI action that fired a map update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    ApplyBasemap,
    ApplySplit,
    UploadFile,
}

impl Trigger {
    /// Id of the dashboard element that fires this trigger.
    pub fn element_id(self) -> &'static str {
        match self {
            Trigger::ApplyBasemap => "apply-basemap",
            Trigger::ApplySplit => "apply-split",
            Trigger::UploadFile => "upload-data",
        }
    }
}

impl FromStr for Trigger {
    type Err = ();

    /// Accepts `prop_id`-style ids too (`apply-basemap.n_clicks`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = s.split('.').next().unwrap_or_default().trim();
        match id {
            "apply-basemap" => Ok(Trigger::ApplyBasemap),
            "apply-split" => Ok(Trigger::ApplySplit),
            "upload-data" | "upload-file" => Ok(Trigger::UploadFile),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.element_id())
    }
}

/// Parameters of a map update; which fields matter depends on the trigger.
#[derive(Debug, Clone, Default)]
pub struct MapParams {
    pub n_clicks: Option<u64>,
    pub basemap: Option<String>,
    pub left_layer: Option<String>,
    pub right_layer: Option<String>,
    pub upload: Option<Upload>,
}

/// JSON body of `POST /api/map`.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
pub struct MapUpdateRequest {
    pub trigger: Option<String>,
    pub n_clicks: Option<u64>,
    pub basemap: Option<String>,
    pub left_layer: Option<String>,
    pub right_layer: Option<String>,
    /// Browser data URL of the uploaded file.
    pub contents: Option<String>,
    pub filename: Option<String>,
}

impl MapUpdateRequest {
    /// Split into the active trigger and decoded parameters.
    ///
    /// Trigger ids that are not map triggers yield `None`. Upload contents
    /// are only decoded when the upload is the active trigger.
    pub fn into_parts(self) -> Result<(Option<Trigger>, MapParams), MapError> {
        let trigger = self.trigger.as_deref().and_then(|t| t.parse::<Trigger>().ok());
        let upload = match (trigger, self.contents.as_deref()) {
            (Some(Trigger::UploadFile), Some(contents)) if !contents.is_empty() => {
                let filename = self.filename.ok_or(MapError::MissingParameter("filename"))?;
                Some(Upload {
                    bytes: upload::decode_data_url(contents)?,
                    filename,
                })
            }
            _ => None,
        };
        let params = MapParams {
            n_clicks: self.n_clicks,
            basemap: self.basemap,
            left_layer: self.left_layer,
            right_layer: self.right_layer,
            upload,
        };
        Ok((trigger, params))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}
