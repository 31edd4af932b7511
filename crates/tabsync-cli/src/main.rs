//! tabsync: inspect and run cross-tab state synchronization
//!
//! Offline commands (read JSON files, print JSON):
//!   reconcile --old <f> --incoming <f>  - merge an incoming tree into a local one
//!   project <f>                         - keep only the given paths
//!   exclude <f>                         - drop the given paths
//!   config show                         - display current configuration
//!
//! Live command:
//!   tab --dir <d>   - run one tab against a directory-backed storage; each
//!                     stdin line `path=<json>` commits a mutation

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use tabsync_core::config::{LogFormat, TabsyncConfig};
use tabsync_core::{MutationEvent, StateTree, TreePath};
use tabsync_sync::projection::{exclude, project};
use tabsync_sync::{
    reconcile, DirStorage, HostStore, MemoryStore, SyncConfig, SyncCoordinator, Tab,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "tabsync",
    version,
    about = "Cross-tab state synchronization",
    long_about = "tabsync: reconcile, project and live-sync JSON state trees shared between tabs"
)]
struct Cli {
    /// Path to tabsync.toml configuration file
    #[arg(long, short = 'c', env = "TABSYNC_CONFIG", default_value = "tabsync.toml")]
    config: PathBuf,

    /// Log format (overrides config)
    #[arg(long, env = "TABSYNC_LOG_FORMAT")]
    log_format: Option<CliLogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum CliLogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Merge an incoming tree into a local tree and print the result
    ///
    /// Without --path the paths come from the config's `states_paths`; with
    /// no paths at all the incoming tree replaces the local one.
    Reconcile {
        /// Local (old) state tree, JSON file
        #[arg(long)]
        old: PathBuf,
        /// Incoming state tree, JSON file
        #[arg(long)]
        incoming: PathBuf,
        /// Dot-delimited path to merge (repeatable)
        #[arg(long = "path", short = 'p')]
        paths: Vec<TreePath>,
    },

    /// Print a tree holding only the given paths
    Project {
        /// State tree, JSON file
        file: PathBuf,
        /// Dot-delimited path to keep (repeatable)
        #[arg(long = "path", short = 'p', required = true)]
        paths: Vec<TreePath>,
    },

    /// Print a tree without the given paths
    Exclude {
        /// State tree, JSON file
        file: PathBuf,
        /// Dot-delimited path to drop (repeatable)
        #[arg(long = "path", short = 'p', required = true)]
        paths: Vec<TreePath>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Run a live tab on a directory-backed storage until Ctrl-C
    Tab {
        /// Storage directory shared with other tabs
        #[arg(long, env = "TABSYNC_DIR")]
        dir: PathBuf,
        /// Initial local state, JSON file (default: empty object)
        #[arg(long)]
        state: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = TabsyncConfig::load(&cli.config)
        .with_context(|| format!("loading config: {}", cli.config.display()))?;

    let format = match cli.log_format {
        Some(CliLogFormat::Json) => LogFormat::Json,
        Some(CliLogFormat::Text) => LogFormat::Text,
        None => config.logging.format,
    };
    init_logging(&config.logging.level, format);

    match cli.command {
        Commands::Reconcile { old, incoming, paths } => {
            cmd_reconcile(&config, &old, &incoming, paths)
        }
        Commands::Project { file, paths } => {
            print_tree(&project(&read_tree(&file)?, &paths))
        }
        Commands::Exclude { file, paths } => {
            print_tree(&exclude(&read_tree(&file)?, &paths))
        }
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
        Commands::Tab { dir, state } => cmd_tab(&config, &dir, state.as_deref()).await,
    }
}

fn init_logging(level: &str, format: LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr; stdout carries JSON trees only
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn read_tree(path: &Path) -> Result<StateTree> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn print_tree(tree: &StateTree) -> Result<()> {
    let rendered = serde_json::to_string_pretty(tree).context("serializing tree")?;
    println!("{rendered}");
    Ok(())
}

// ── `tabsync reconcile` ───────────────────────────────────────────────────────

fn cmd_reconcile(
    config: &TabsyncConfig,
    old: &Path,
    incoming: &Path,
    paths: Vec<TreePath>,
) -> Result<()> {
    let paths = if paths.is_empty() {
        config.sync.states_paths.clone()
    } else {
        paths
    };
    let merged = reconcile(&read_tree(old)?, &read_tree(incoming)?, &paths);
    print_tree(&merged)
}

// ── `tabsync config show` ─────────────────────────────────────────────────────

fn cmd_config_show(config: &TabsyncConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── `tabsync tab` ─────────────────────────────────────────────────────────────

/// Memory store that prints every state installed from another tab.
struct PrintingStore(MemoryStore);

impl HostStore for PrintingStore {
    fn state(&self) -> StateTree {
        self.0.state()
    }

    fn replace_state(&self, state: StateTree) {
        match serde_json::to_string(&state) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!(error = %e, "rendering replaced state"),
        }
        self.0.replace_state(state);
    }

    fn subscribe(&self) -> tokio::sync::mpsc::UnboundedReceiver<MutationEvent> {
        self.0.subscribe()
    }
}

/// Parse a `path=<json>` line; a value that is not valid JSON is taken as a string.
fn parse_assignment(line: &str) -> Result<(TreePath, StateTree)> {
    let (raw_path, raw_value) = line
        .split_once('=')
        .context("expected `path=<json value>`")?;
    let path = TreePath::parse(raw_path.trim())?;
    let raw_value = raw_value.trim();
    let value = serde_json::from_str(raw_value)
        .unwrap_or_else(|_| StateTree::String(raw_value.to_string()));
    Ok((path, value))
}

async fn cmd_tab(config: &TabsyncConfig, dir: &Path, state: Option<&Path>) -> Result<()> {
    let initial = match state {
        Some(path) => read_tree(path)?,
        None => StateTree::Object(Default::default()),
    };
    let storage = DirStorage::open(dir)
        .with_context(|| format!("opening storage dir: {}", dir.display()))?;
    let tab = Tab::new(storage);
    info!(tab = tab.id(), dir = %dir.display(), "tab opened");

    let coordinator = SyncCoordinator::new(SyncConfig::new(config.sync.clone()), tab)
        .context("setting up sync coordinator")?;
    let store = PrintingStore(MemoryStore::new(initial));
    let handle = store.0.clone();
    let cancel = CancellationToken::new();

    let ctrl_c = {
        let cancel = cancel.clone();
        async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                res = tokio::signal::ctrl_c() => {
                    if res.is_ok() {
                        info!("interrupted, shutting down");
                    }
                }
            }
            cancel.cancel();
        }
    };

    let sync = async {
        let result = coordinator.run(&store, cancel.clone()).await;
        cancel.cancel();
        result
    };

    let input = {
        let cancel = cancel.clone();
        async move {
            let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) if line.trim().is_empty() => continue,
                        Ok(Some(line)) => match parse_assignment(&line) {
                            Ok((path, value)) => {
                                let kind = format!("set {path}");
                                handle.commit(&kind, value.clone(), |s| {
                                    tabsync_sync::path::set(s, &path, value)
                                });
                            }
                            Err(e) => warn!(error = %e, line = %line, "ignoring input line"),
                        },
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "reading stdin");
                            break;
                        }
                    },
                }
            }
        }
    };

    let (result, (), ()) = tokio::join!(sync, ctrl_c, input);
    result.context("sync loop failed")
}
