use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "mapdash")]
#[command(about = "Map dashboard and embedded notebook demo server", long_about = None)]
pub struct Cli {
    /// Config file (defaults to mapdash.toml, then mapdash.example.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Address to listen on (overrides [server].host)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to listen on (overrides [server].port)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[command(subcommand)]
    pub command: Mode,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Serve the map dashboard
    Dashboard,
    /// Start a notebook server and serve a page embedding it
    Notebook,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let cli = Cli::try_parse_from(["mapdash", "notebook", "--port", "9000", "--host", "0.0.0.0"]).unwrap();
        assert_eq!(cli.command, Mode::Notebook);
        assert_eq!(cli.port, Some(9000));
        assert_eq!(cli.host.as_deref(), Some("0.0.0.0"));
        assert!(cli.config.is_none());
    }

    #[test]
    fn mode_is_required() {
        assert!(Cli::try_parse_from(["mapdash"]).is_err());
    }
}
