use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use tracing::info;

use crate::basemap::Basemap;
use crate::error::NotebookError;
use crate::map::MapView;

const CONFIG_FILES: [&str; 2] = ["mapdash.toml", "mapdash.example.toml"];

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub thread_count: Option<usize>,
    pub server: ServerConfig,
    pub map: MapConfig,
    pub notebook: NotebookConfig,
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest accepted request body. Uploads travel base64-encoded, so a
    /// file can be about three quarters of this.
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8050,
            max_upload_bytes: crate::server::DEFAULT_MAX_UPLOAD_BYTES,
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct MapConfig {
    pub view: MapView,
    /// Where the last rendered document lives; a temporary directory when unset.
    pub work_dir: Option<PathBuf>,
    pub template_dir: Option<PathBuf>,
    pub default_basemap: String,
    pub default_left: String,
    pub default_right: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            view: MapView::default(),
            work_dir: None,
            template_dir: Some(PathBuf::from("templates")),
            default_basemap: Basemap::OpenStreetMap.id().into(),
            default_left: Basemap::Terrain.id().into(),
            default_right: Basemap::OpenTopoMap.id().into(),
        }
    }
}

#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct NotebookConfig {
    pub command: String,
    pub args: Vec<String>,
    pub ip: String,
    pub port: u16,
    pub root_dir: PathBuf,
    /// Access token; without one the server is only reachable from loopback.
    pub token: Option<String>,
    pub startup_timeout_secs: u64,
    /// How long `stop` waits after SIGTERM before killing the server.
    pub stop_timeout_secs: u64,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            command: "jupyter".into(),
            args: vec!["lab".into()],
            ip: "127.0.0.1".into(),
            port: 8888,
            root_dir: PathBuf::from("jupyter"),
            token: None,
            startup_timeout_secs: 30,
            stop_timeout_secs: 5,
        }
    }
}

impl NotebookConfig {
    /// Tokenless servers must stay on a loopback address.
    pub fn check_bind(&self) -> Result<(), NotebookError> {
        if self.token.as_deref().is_some_and(|t| !t.is_empty()) {
            return Ok(());
        }
        let loopback = self.ip == "localhost"
            || self.ip.parse::<IpAddr>().map(|ip| ip.is_loopback()).unwrap_or(false);
        if loopback {
            Ok(())
        } else {
            Err(NotebookError::InsecureBind(self.ip.clone()))
        }
    }
}

impl Config {
    /// Load from `path`, or from the first default config file present,
    /// falling back to built-in defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => Some(p.to_path_buf()),
            None => CONFIG_FILES.iter().map(PathBuf::from).find(|p| p.exists()),
        };

        let config = match path {
            Some(path) => {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                let config: Config = toml::from_str(&content)
                    .with_context(|| format!("parsing config {}", path.display()))?;
                info!("loaded config from {}", path.display());
                config
            }
            None => {
                info!("no config file found, using defaults");
                Config::default()
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        for name in [&self.map.default_basemap, &self.map.default_left, &self.map.default_right] {
            name.parse::<Basemap>().context("invalid [map] default")?;
        }
        if self.server.max_upload_bytes == 0 {
            anyhow::bail!("[server] max_upload_bytes must be greater than zero");
        }
        self.notebook.check_bind()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            thread_count = 2

            [server]
            port = 9000

            [map.view]
            center = [51.5, -0.1]
            zoom = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.thread_count, Some(2));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.map.view.zoom, 10);
        assert_eq!(config.map.default_left, "TERRAIN");
        assert_eq!(config.notebook.port, 8888);
        config.validate().unwrap();
    }

    #[test]
    fn explicit_file_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[notebook]\nport = 9999\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.notebook.port, 9999);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/mapdash.toml"))).is_err());
    }

    #[test]
    fn upload_limit_is_configurable() {
        let config: Config = toml::from_str("[server]\nmax_upload_bytes = 1048576\n").unwrap();
        assert_eq!(config.server.max_upload_bytes, 1024 * 1024);
        assert_eq!(
            Config::default().server.max_upload_bytes,
            crate::server::DEFAULT_MAX_UPLOAD_BYTES
        );

        let mut config = Config::default();
        config.server.max_upload_bytes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_default_basemap_is_rejected() {
        let mut config = Config::default();
        config.map.default_basemap = "Atlantis".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn open_bind_requires_token() {
        let mut nb = NotebookConfig {
            ip: "0.0.0.0".into(),
            ..Default::default()
        };
        assert!(matches!(nb.check_bind(), Err(NotebookError::InsecureBind(_))));
        nb.token = Some(String::new());
        assert!(nb.check_bind().is_err());
        nb.token = Some("s3cret".into());
        assert!(nb.check_bind().is_ok());

        for ip in ["127.0.0.1", "::1", "localhost"] {
            let nb = NotebookConfig {
                ip: ip.into(),
                ..Default::default()
            };
            assert!(nb.check_bind().is_ok(), "{}", ip);
        }
    }
}
