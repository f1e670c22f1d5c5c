use thiserror::Error;

/// Failures surfaced by the map-update path.
#[derive(Error, Debug)]
pub enum MapError {
    #[error("unknown basemap: {0}")]
    UnknownBasemap(String),

    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("invalid GeoJSON in {name}: {reason}")]
    InvalidGeoJson { name: String, reason: String },

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),

    #[error("template error: {0}")]
    Template(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<tera::Error> for MapError {
    fn from(e: tera::Error) -> Self {
        // tera keeps the useful part of the message in the source chain
        let mut msg = e.to_string();
        let mut source = std::error::Error::source(&e);
        while let Some(inner) = source {
            msg.push_str(": ");
            msg.push_str(&inner.to_string());
            source = inner.source();
        }
        MapError::Template(msg)
    }
}

/// Failures of the background notebook server.
#[derive(Error, Debug)]
pub enum NotebookError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("notebook server exited during startup ({0})")]
    ExitedEarly(String),

    #[error("notebook server did not become ready on port {port} within {secs}s")]
    NotReady { port: u16, secs: u64 },

    #[error("refusing to bind notebook server to {0} without a token")]
    InsecureBind(String),

    #[error("invalid notebook URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
