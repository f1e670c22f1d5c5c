//! Background notebook server (JupyterLab) owned by the application.
//!
//! The server is a child process behind an explicit handle. `start` spawns
//! it and waits until its status endpoint answers; `stop` asks it to shut
//! down with SIGTERM, kills it after `stop_timeout_secs`, and is idempotent.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::NotebookConfig;
use crate::error::NotebookError;

pub const FRAME_ANCESTORS: &str = "frame-ancestors 'self' http://localhost:* http://127.0.0.1:*";

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SAMPLE_NOTEBOOK: &str = "notebook.ipynb";

pub struct NotebookServer {
    config: NotebookConfig,
    root_dir: PathBuf,
    child: Option<Child>,
    client: reqwest::Client,
}

impl NotebookServer {
    pub fn new(config: NotebookConfig) -> Result<Self, NotebookError> {
        config.check_bind()?;
        let root_dir = std::path::absolute(&config.root_dir)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()
            .map_err(|e| NotebookError::Io(std::io::Error::other(e)))?;
        Ok(Self {
            config,
            root_dir,
            child: None,
            client,
        })
    }

    fn browser_host(&self) -> String {
        match self.config.ip.as_str() {
            "0.0.0.0" | "::" => "127.0.0.1".to_string(),
            ip if ip.contains(':') => format!("[{}]", ip),
            ip => ip.to_string(),
        }
    }

    fn base_url(&self) -> Result<Url, NotebookError> {
        Ok(Url::parse(&format!("http://{}:{}/", self.browser_host(), self.config.port))?)
    }

    /// URL the page's iframe points at.
    pub fn lab_url(&self) -> Result<Url, NotebookError> {
        let mut url = self.base_url()?.join("lab")?;
        if let Some(token) = self.token() {
            url.query_pairs_mut().append_pair("token", token);
        }
        Ok(url)
    }

    fn token(&self) -> Option<&str> {
        self.config.token.as_deref().filter(|t| !t.is_empty())
    }

    fn args(&self) -> Vec<String> {
        let mut args = self.config.args.clone();
        args.extend([
            "--no-browser".to_string(),
            format!("--ip={}", self.config.ip),
            format!("--port={}", self.config.port),
            "--ServerApp.port_retries=0".to_string(),
            format!("--ServerApp.root_dir={}", self.root_dir.display()),
            format!("--IdentityProvider.token={}", self.token().unwrap_or_default()),
            format!(
                "--ServerApp.tornado_settings={{'headers': {{'Content-Security-Policy': \"{}\"}}}}",
                FRAME_ANCESTORS
            ),
        ]);
        args
    }

    pub fn is_running(&mut self) -> bool {
        match self.child.as_mut().map(|c| c.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(_))) | Some(Err(_)) | None => false,
        }
    }

    /// Spawn the server and wait until it answers.
    pub async fn start(&mut self) -> Result<(), NotebookError> {
        if self.is_running() {
            debug!("notebook server already running");
            return Ok(());
        }
        prepare_root(&self.root_dir)?;
        self.spawn()?;
        if let Err(e) = self.wait_ready().await {
            self.stop().await?;
            return Err(e);
        }
        info!("notebook server ready at {}", self.base_url()?);
        Ok(())
    }

    fn spawn(&mut self) -> Result<(), NotebookError> {
        let args = self.args();
        debug!("spawning {} {:?}", self.config.command, args);
        let child = Command::new(&self.config.command)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| NotebookError::Spawn {
                command: self.config.command.clone(),
                source,
            })?;
        self.child = Some(child);
        Ok(())
    }

    async fn wait_ready(&mut self) -> Result<(), NotebookError> {
        let status_url = self.base_url()?.join("api/status")?;
        let timeout = Duration::from_secs(self.config.startup_timeout_secs);
        let deadline = Instant::now() + timeout;

        loop {
            if let Some(child) = self.child.as_mut() {
                if let Some(status) = child.try_wait()? {
                    return Err(NotebookError::ExitedEarly(status.to_string()));
                }
            }

            let mut req = self.client.get(status_url.clone());
            if let Some(token) = self.token() {
                req = req.header("Authorization", format!("token {}", token));
            }
            match req.send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => debug!("notebook status: {}", resp.status()),
                Err(e) => debug!("notebook not up yet: {}", e),
            }

            if Instant::now() >= deadline {
                return Err(NotebookError::NotReady {
                    port: self.config.port,
                    secs: timeout.as_secs(),
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Terminate the server; a no-op if it never started or already exited.
    pub async fn stop(&mut self) -> Result<(), NotebookError> {
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };
        if let Some(status) = child.try_wait()? {
            debug!("notebook server already exited ({})", status);
            return Ok(());
        }
        let grace = Duration::from_secs(self.config.stop_timeout_secs);
        match terminate(&mut child, grace).await {
            Ok(status) => {
                info!("notebook server stopped ({})", status);
                Ok(())
            }
            // exited between try_wait and kill
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => {
                warn!("failed to stop notebook server: {}", e);
                Err(e.into())
            }
        }
    }
}

/// SIGTERM, then SIGKILL if the child is still alive after `grace`.
async fn terminate(child: &mut Child, grace: Duration) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            // SAFETY: kill(2) takes plain integers; the pid is our unreaped child.
            let sent = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) } == 0;
            if sent {
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(status) => return status,
                    Err(_) => warn!("notebook server still up {:?} after SIGTERM, killing", grace),
                }
            }
        }
    }
    #[cfg(not(unix))]
    let _ = grace;

    child.kill().await?;
    child.wait().await
}

/// Create the notebook root and seed a sample notebook when it is empty.
fn prepare_root(root: &Path) -> Result<(), NotebookError> {
    std::fs::create_dir_all(root)?;
    let sample = root.join(SAMPLE_NOTEBOOK);
    if !sample.exists() {
        let notebook = serde_json::json!({
            "cells": [
                {
                    "cell_type": "markdown",
                    "metadata": {},
                    "source": ["# Welcome to Jupyter Notebook\n", "This is a sample notebook."]
                },
                {
                    "cell_type": "code",
                    "execution_count": null,
                    "metadata": {},
                    "outputs": [],
                    "source": ["print(\"Hello, World!\")"]
                }
            ],
            "metadata": {
                "kernelspec": {"display_name": "Python 3", "language": "python", "name": "python3"}
            },
            "nbformat": 4,
            "nbformat_minor": 4
        });
        let text = serde_json::to_string_pretty(&notebook).map_err(std::io::Error::other)?;
        std::fs::write(&sample, text)?;
        info!("seeded {}", sample.display());
    }
    Ok(())
}
