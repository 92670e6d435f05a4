//! `dirwatch`: run a command whenever watched directories change.
//!
//! Without a command, the tag of every changed directory is printed to
//! stdout, one per line. Logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use dirwatch::location::cloud_sync_roots_from_env;
use dirwatch::{WatchConfig, WatchSet, WatchSetConfig, check_location};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "dirwatch",
    version,
    about = "Run a command whenever watched directories change"
)]
struct Cli {
    /// Directories to watch.
    dirs: Vec<PathBuf>,

    /// TOML file listing directories to watch.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Quiet period that ends a burst of changes, in milliseconds.
    #[arg(short = 'w', long)]
    group_window_ms: Option<u64>,

    /// Only watch the top level of directories given on the command line.
    #[arg(long)]
    non_recursive: bool,

    /// Log debug output.
    #[arg(short, long)]
    verbose: bool,

    /// Command to run after each burst of changes.
    #[arg(last = true)]
    command: Vec<String>,
}

impl Cli {
    /// Merge the config file with directories from the command line.
    fn watch_set(&self) -> Result<WatchSetConfig> {
        let mut config = match &self.config {
            Some(path) => WatchSetConfig::load(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => WatchSetConfig::default(),
        };

        if let Some(ms) = self.group_window_ms {
            config.group_window_ms = ms;
        }
        for dir in &self.dirs {
            let watch = WatchConfig::new(dir);
            config.watches.push(if self.non_recursive {
                watch.non_recursive()
            } else {
                watch
            });
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = cli.watch_set()?;
    check_locations(&config)?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping watchers");
            }
            cancel.cancel();
        }
    });

    let (tx, mut rx) = mpsc::channel(64);
    let mut set = WatchSet::from_config(&config, &tx, cancel.clone())?;
    drop(tx);

    let outcome: Result<()> = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            Some((tag, result)) = set.join_next() => {
                if let Err(e) = result {
                    break Err(e).with_context(|| format!("watching {tag} failed"));
                }
            }
            tag = rx.recv() => match tag {
                Some(tag) => {
                    if let Err(e) = on_change(tag, &mut rx, &cli.command, &cancel).await {
                        break Err(e);
                    }
                }
                None => break Ok(()),
            },
        }
    };

    let stopped = set.shutdown().await.context("failed to stop watchers");
    outcome.and(stopped)
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Refuse to watch inside vendor-managed directories; warn about synced ones.
fn check_locations(config: &WatchSetConfig) -> Result<()> {
    let mut roots = cloud_sync_roots_from_env();
    roots.extend(config.guarded_roots.iter().cloned());

    let mut blocked = false;
    for watch in &config.watches {
        let path = std::path::absolute(&watch.path)
            .with_context(|| format!("failed to resolve {}", watch.path.display()))?;
        for diagnostic in check_location(&path, &roots) {
            if diagnostic.is_error() {
                error!("{}", diagnostic.message());
                blocked = true;
            } else {
                warn!("{}", diagnostic.message());
            }
        }
    }

    if blocked {
        bail!("refusing to watch directories inside managed locations");
    }
    Ok(())
}

/// React to a change, then to whatever piled up while reacting, until the
/// channel has nothing new.
async fn on_change(
    first: String,
    rx: &mut mpsc::Receiver<String>,
    command: &[String],
    cancel: &CancellationToken,
) -> Result<()> {
    let mut tags = vec![first];
    while !tags.is_empty() && !cancel.is_cancelled() {
        info!("Change detected in {}", tags.join(", "));
        if command.is_empty() {
            for tag in &tags {
                println!("{tag}");
            }
        } else {
            run_command(command, cancel).await?;
        }

        tags.clear();
        drain_pending(rx, &mut tags);
    }
    Ok(())
}

/// Move queued tags into `tags`, skipping ones already present.
fn drain_pending(rx: &mut mpsc::Receiver<String>, tags: &mut Vec<String>) {
    while let Ok(tag) = rx.try_recv() {
        if tags.contains(&tag) {
            debug!("Folding repeated change in {tag}");
        } else {
            tags.push(tag);
        }
    }
}

async fn run_command(command: &[String], cancel: &CancellationToken) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        return Ok(());
    };

    let mut child = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;

    tokio::select! {
        status = child.wait() => {
            let status = status.with_context(|| format!("failed to wait for {program}"))?;
            if status.success() {
                info!("{program} finished");
            } else {
                warn!("{program} exited with {status}");
            }
        }
        _ = cancel.cancelled() => {
            info!("Stopping {program}");
            child.kill().await.with_context(|| format!("failed to stop {program}"))?;
        }
    }
    Ok(())
}
