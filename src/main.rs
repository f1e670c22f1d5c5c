use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mapdash::cli::{Cli, Mode};
use mapdash::config::Config;
use mapdash::handler::MapHandler;
use mapdash::map::MapBuilder;
use mapdash::notebook::NotebookServer;
use mapdash::render::Renderer;
use mapdash::server::{self, AppState, Page};
use mapdash::template_engine::TemplateEngine;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(host) = cli.host {
        config.server.host = host;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    let thread_count = config.thread_count.unwrap_or_else(num_cpus::get);

    info!("starting server with {} threads", thread_count);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(thread_count)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli.command, config))
}

async fn async_main(mode: Mode, config: Config) -> anyhow::Result<()> {
    // kept alive until shutdown; removes the directory on drop
    let (work_dir, _temp_guard) = match &config.map.work_dir {
        Some(dir) => (dir.clone(), None),
        None => {
            let tmp = tempfile::Builder::new().prefix("mapdash-").tempdir()?;
            (tmp.path().to_path_buf(), Some(tmp))
        }
    };
    let upload_dir: PathBuf = work_dir.join("uploads");
    std::fs::create_dir_all(&upload_dir).with_context(|| format!("creating {}", upload_dir.display()))?;

    let templates = Arc::new(TemplateEngine::from_dir_or_builtin(config.map.template_dir.as_deref())?);
    let handler = MapHandler::new(
        MapBuilder::new(config.map.view, upload_dir),
        Renderer::new(templates.clone()),
        work_dir,
    )?;
    handler.initialize()?;

    let mut notebook = None;
    let page = match mode {
        Mode::Dashboard => Page::Dashboard,
        Mode::Notebook => {
            let mut server = NotebookServer::new(config.notebook.clone())?;
            let url = server.lab_url()?.to_string();
            let running = match server.start().await {
                Ok(()) => true,
                Err(e) => {
                    error!("notebook server unavailable: {}", e);
                    false
                }
            };
            info!("notebook should be available at {}", url);
            notebook = Some(server);
            Page::Notebook { url, running }
        }
    };

    let state = Arc::new(AppState {
        handler,
        templates,
        map: config.map.clone(),
        page,
    });
    let app = server::router(state, config.server.max_upload_bytes);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let served = serve(&addr, app).await;

    if let Some(mut nb) = notebook {
        if let Err(e) = nb.stop().await {
            warn!("stopping notebook server: {}", e);
        }
    }
    served
}

async fn serve(addr: &str, app: axum::Router) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await.with_context(|| format!("binding {}", addr))?;
    info!("listening on http://{}", addr);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

/// Resolves on ctrl-c, or on SIGTERM where that exists, so the notebook
/// child is stopped on either.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("no ctrl-c handler ({})", e);
            std::future::pending::<()>().await
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("no SIGTERM handler ({})", e);
                std::future::pending::<()>().await
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl-c received, shutting down"),
        () = terminate => info!("SIGTERM received, shutting down"),
    }
}
