//! Binary entrypoint for the Tavernkeep CLI.
//!
//! Commands:
//! - `start [--bind <addr>]` - run the lobby server
//! - `init` - write a starter `config.toml`
//! - `status` - summarize the mirror (lobbies, chat and roll counts)
//! - `campaigns` - list the campaigns a GM can load
//!
//! See the library crate docs for module-level details: `tavernkeep::`.
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tokio::sync::mpsc;

use tavernkeep::catalog::CampaignCatalog;
use tavernkeep::config::Config;
use tavernkeep::gateway::{router, AppState, SessionHub};
use tavernkeep::lobby::{CredentialGate, LobbyRegistry};
use tavernkeep::storage::{MirrorHandle, MirrorStore};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "tavernkeep")]
#[command(about = "A real-time tabletop lobby server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the lobby server
    Start {
        /// Listen address, overriding server.bind
        #[arg(short, long)]
        bind: Option<String>,
    },
    /// Write a default configuration file
    Init,
    /// Show what the mirror has recorded
    Status,
    /// List loadable campaigns
    Campaigns,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Start { bind } => {
            let mut config = load_or_default(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            if let Some(addr) = bind {
                config.server.bind = addr;
                config.validate()?;
            }
            info!("Starting {} v{}", config.server.name, env!("CARGO_PKG_VERSION"));
            serve(config).await?;
        }
        Commands::Init => {
            init_logging(&None, cli.verbose);
            if tokio::fs::try_exists(&cli.config).await.unwrap_or(false) {
                return Err(anyhow!("{} already exists; remove it first", cli.config));
            }
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
        }
        Commands::Status => {
            let config = load_or_default(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            show_status(&config)?;
        }
        Commands::Campaigns => {
            let config = load_or_default(&cli.config).await?;
            init_logging(&Some(config.clone()), cli.verbose);
            let catalog = load_catalog(&config);
            for c in catalog.list() {
                println!("{:<20} {:>3} scenes  {}", c.key, c.scenes, c.title);
            }
        }
    }

    Ok(())
}

async fn load_or_default(path: &str) -> Result<Config> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        Config::load(path).await
    } else {
        Ok(Config::default())
    }
}

fn load_catalog(config: &Config) -> CampaignCatalog {
    let mut catalog = CampaignCatalog::builtin();
    if let Some(dir) = &config.campaigns.dir {
        match catalog.load_dir(dir) {
            Ok(n) => info!("Loaded {} campaign(s) from {}", n, dir),
            Err(e) => warn!("Skipping campaign directory: {}", e),
        }
    }
    catalog
}

async fn serve(config: Config) -> Result<()> {
    let catalog = Arc::new(load_catalog(&config));
    let registry = Arc::new(LobbyRegistry::new(config.lobby.defaults()));
    let gate = CredentialGate::from_config(config.argon2())?;

    let (mirror, writer) = if config.storage.mirror_enabled {
        let path = config.storage.mirror_path();
        let store = MirrorStore::open(&path)?;
        info!("Mirroring lobby activity to {}", path.display());
        let (handle, join) = MirrorHandle::spawn(store)?;
        (Some(handle), Some(join))
    } else {
        (None, None)
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let hub = SessionHub::new(&config, registry.clone(), catalog.clone(), gate, mirror);
    let hub_task = tokio::spawn(hub.run(events_rx));

    let app = router(AppState::new(registry, catalog, events_tx));
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!("Listening on ws://{}/ws", config.server.bind);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await?;

    // Sockets still open keep an event sender alive; give them a moment,
    // then stop the hub so its mirror handle drops and the writer flushes.
    let mut hub_task = hub_task;
    if tokio::time::timeout(SHUTDOWN_GRACE, &mut hub_task).await.is_err() {
        warn!("Session hub still busy after {:?}; stopping it", SHUTDOWN_GRACE);
        hub_task.abort();
        let _ = hub_task.await;
    }
    if let Some(join) = writer {
        if join.join().is_err() {
            warn!("Mirror writer panicked");
        }
    }
    info!("Server stopped");
    Ok(())
}

fn show_status(config: &Config) -> Result<()> {
    println!("{} v{}", config.server.name, env!("CARGO_PKG_VERSION"));
    println!("Bind: {}", config.server.bind);
    if !config.storage.mirror_enabled {
        println!("Mirror: disabled");
        return Ok(());
    }
    let path = config.storage.mirror_path();
    if !path.exists() {
        println!("Mirror: nothing recorded yet at {}", path.display());
        return Ok(());
    }
    let store = MirrorStore::open(&path)?;
    let (chat, rolls) = store.counts();
    println!("Mirror: {} ({} chat entries, {} rolls)", path.display(), chat, rolls);
    for meta in store.lobbies()? {
        println!(
            "  {:<24} gm={:<16} password={} updated={}",
            meta.name,
            meta.gm.as_deref().unwrap_or("-"),
            if meta.has_password { "yes" } else { "no" },
            meta.updated_at.format("%Y-%m-%d %H:%M:%SZ")
        );
    }
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let configured = config
        .as_ref()
        .and_then(|c| c.logging.level.parse::<log::LevelFilter>().ok())
        .unwrap_or(log::LevelFilter::Info);
    let base_level = match verbosity {
        0 => configured,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    let file = config
        .as_ref()
        .and_then(|c| c.logging.file.as_ref())
        .and_then(|path| std::fs::OpenOptions::new().create(true).append(true).open(path).ok());
    match file {
        Some(f) => {
            let security_path = config.as_ref().and_then(|c| c.logging.security_file.clone());
            let write_mutex = Arc::new(std::sync::Mutex::new(f));
            let is_tty = atty::is(atty::Stream::Stdout);
            builder.format(move |fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                let line = format!("{} [{}] {}", ts, record.level(), record.args());
                if let Ok(mut guard) = write_mutex.lock() {
                    let _ = writeln!(guard, "{}", line);
                }
                if record.target() == "security" {
                    if let Some(ref sec_path) = security_path {
                        if let Ok(mut sf) = std::fs::OpenOptions::new()
                            .create(true)
                            .append(true)
                            .open(sec_path)
                        {
                            let _ = writeln!(sf, "{}", line);
                        }
                    }
                }
                if is_tty {
                    writeln!(fmt, "{}", line)
                } else {
                    Ok(())
                }
            });
        }
        None => {
            builder.format(|fmt, record| {
                let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
                writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
            });
        }
    }
    let _ = builder.try_init();
}
