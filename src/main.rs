//! muster: a tmux dev-cluster launcher.
//!
//! Brings up a fixed-size cluster of replica and client processes inside a
//! multi-pane tmux session, gates replica startup on a build step scraped
//! from pane output, and offers an interactive prompt to restart, attach to,
//! or tear down the whole cluster.

mod cluster;
mod config;
mod console;
mod controller;
mod launcher;
mod layout;
mod matcher;
mod probe;
mod tmux;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::config::{load_config, ClusterConfig, ConfigFile, Overrides};
use crate::controller::Controller;
use crate::probe::PresentationMode;
use crate::tmux::Tmux;

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "muster",
    version,
    about = "Launch a replica/client dev cluster in tmux, gated on a build step"
)]
struct Cli {
    /// Path to muster.toml configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Ignore any muster.toml in the current directory.
    #[arg(long)]
    no_config: bool,
    /// Override the replica count.
    #[arg(long)]
    replicas: Option<usize>,
    /// Override the client count.
    #[arg(long)]
    clients: Option<usize>,
    /// Override the tmux session name.
    #[arg(long)]
    session: Option<String>,
    /// Never spawn a terminal window; print attach instructions instead.
    #[arg(long)]
    headless: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let file = load_config_file(&cli)?;
    let overrides = Overrides {
        session: cli.session.clone(),
        replicas: cli.replicas,
        clients: cli.clients,
    };
    let config = ClusterConfig::resolve(file, &overrides)?;

    let mut mode = probe::probe().await?;
    if cli.headless {
        mode = PresentationMode::Headless;
    }

    let mux = Arc::new(Tmux::new());
    let mut controller = Controller::new(mux, config, mode)?;

    println!("launching cluster...");
    match controller.launch().await {
        Ok(()) => println!(
            "cluster running with {} panes in tmux session '{}'",
            controller.session_count(),
            controller.session_name()
        ),
        // The cluster is torn down but the prompt stays up: a `restart`
        // retries from a clean layout once the build is fixed.
        Err(err) => eprintln!("launch failed: {err:#}"),
    }

    console::run(&mut controller).await
}

fn load_config_file(cli: &Cli) -> Result<ConfigFile> {
    if cli.no_config {
        return Ok(ConfigFile::default());
    }
    let path = cli
        .config
        .clone()
        .or_else(|| default_config_path().filter(|path| path.exists()));
    match path {
        Some(path) => load_config(&path),
        None => Ok(ConfigFile::default()),
    }
}

fn default_config_path() -> Option<PathBuf> {
    let path = Path::new("muster.toml");
    if path.exists() {
        Some(path.to_path_buf())
    } else {
        None
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("muster=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
