use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use console::style;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use autohunt_config::{AppConfig, ConfigLoader, HuntConfig};
use autohunt_core::{Clock, HuntError, StatusBroadcaster, StatusKind, SystemClock};
use autohunt_runtime::{Controller, DryRunActuator, SimulatedGame};
use autohunt_store::SessionStore;

/// 🎯 autohunt: unattended decision loop for client-server game sessions
#[derive(Parser)]
#[command(name = "autohunt", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to autohunt.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the decision loop against the simulated game (plus the API server)
    Start {
        /// Don't start the API server
        #[arg(long)]
        no_server: bool,
    },
    /// Show the status of a running instance
    Status,
    /// Show current configuration
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Initialize a new autohunt.toml in the current or home directory
    Init {
        /// Create in current directory instead of ~/.autohunt/
        #[arg(long)]
        local: bool,
    },
    /// List recorded sessions
    Sessions {
        /// Number of sessions to show
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completions for bash, zsh, or fish
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    pub async fn run(self) -> autohunt_core::Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        let log_level = resolve_log_level(
            self.verbose,
            self.quiet,
            self.log_level.as_deref(),
            &config.logging.level,
        );
        init_tracing(&config.logging.format, log_level);

        match self.command {
            Commands::Start { no_server } => Self::cmd_start(config, no_server, config_loader).await,
            Commands::Status => Self::cmd_status(config).await,
            Commands::Config { json } => Self::cmd_config(config, json),
            Commands::Init { local } => Self::cmd_init(local),
            Commands::Sessions { limit, json } => Self::cmd_sessions(config, limit, json),
            Commands::Completions { shell } => Self::cmd_completions(shell),
        }
    }

    async fn cmd_start(
        config: AppConfig,
        no_server: bool,
        config_loader: ConfigLoader,
    ) -> autohunt_core::Result<()> {
        println!("🎯 autohunt v{}", env!("CARGO_PKG_VERSION"));
        match &config.hunt {
            Some(hunt) => println!(
                "   Profile: {} ({} waypoints, {} mode)",
                hunt.name,
                hunt.route.waypoints.len(),
                hunt.route.mode
            ),
            None => println!("   Profile: none (load one through the API)"),
        }
        println!("   Game: simulated, actions are logged only");
        println!();

        if no_server && config.hunt.is_none() {
            return Err(HuntError::ConfigurationMissing);
        }

        let store = open_store(&config.storage.db_path)?;
        let controller = build_controller(&config);
        autohunt_server::record_sessions(&controller, store.clone());
        spawn_status_logger(&controller);

        // Start config hot-reload watcher (kept alive for duration of runtime)
        let _watcher = match config_loader.watch({
            let controller = controller.clone();
            move |reloaded: &AppConfig| apply_reloaded_profile(&controller, reloaded)
        }) {
            Ok(w) => {
                println!("   Config hot-reload: enabled");
                Some(w)
            }
            Err(e) => {
                warn!(error = %e, "config hot-reload disabled");
                None
            }
        };

        if config.hunt.is_some() {
            let outcome = controller.start()?;
            println!("   Session: {}", outcome.session_id);
        }

        if no_server {
            println!("   Press Ctrl+C to stop");
            tokio::signal::ctrl_c().await?;
        } else {
            println!("   API: http://{}", config.server.listen);
            autohunt_server::start_server(
                config.server.clone(),
                controller.clone(),
                Some(store),
                async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        error!(error = %e, "failed to listen for Ctrl+C");
                    }
                },
            )
            .await?;
        }

        if let Some(record) = controller.stop() {
            println!();
            println!("{}", style("Session finished").bold());
            print_session(&record);
        }
        Ok(())
    }

    async fn cmd_status(config: AppConfig) -> autohunt_core::Result<()> {
        let listen = &config.server.listen;
        println!("Checking status at http://{}...", listen);

        let client = reqwest::Client::new();
        match client
            .get(format!("http://{}/api/v1/bot/status", listen))
            .send()
            .await
        {
            Ok(resp) => {
                let data: serde_json::Value = resp
                    .json()
                    .await
                    .map_err(|e| HuntError::Other(anyhow::Error::new(e)))?;
                println!("{}", serde_json::to_string_pretty(&data)?);
            }
            Err(_) => {
                println!("❌ autohunt is not running at {}", listen);
            }
        }
        Ok(())
    }

    fn cmd_config(config: AppConfig, json: bool) -> autohunt_core::Result<()> {
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| HuntError::Config(e.to_string()))?
            );
        }

        if let Some(hunt) = &config.hunt {
            for w in hunt.check() {
                eprintln!("{}", w);
            }
        }
        Ok(())
    }

    fn cmd_init(local: bool) -> autohunt_core::Result<()> {
        let dir = if local {
            std::env::current_dir()?
        } else {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".autohunt")
        };

        std::fs::create_dir_all(&dir)?;
        let config_path = dir.join("autohunt.toml");

        if config_path.exists() {
            println!("⚠️  {} already exists", config_path.display());
            return Ok(());
        }

        std::fs::write(&config_path, starter_config()?)?;
        println!("✅ Created {}", config_path.display());
        println!("   Edit the [hunt] section, then run: autohunt start");
        Ok(())
    }

    fn cmd_sessions(config: AppConfig, limit: usize, json: bool) -> autohunt_core::Result<()> {
        let store = open_store(&config.storage.db_path)?;
        let sessions = store.recent_sessions(limit)?;
        let totals = store.totals()?;

        if json {
            let out = serde_json::json!({ "sessions": sessions, "totals": totals });
            println!("{}", serde_json::to_string_pretty(&out)?);
            return Ok(());
        }

        if sessions.is_empty() {
            println!("No sessions recorded yet.");
            return Ok(());
        }

        for record in &sessions {
            print_session(record);
            println!();
        }
        println!(
            "{} {} sessions, {} running, {} kills, {} items, {} heals, {} attacks",
            style("Totals:").bold(),
            totals.sessions,
            format_secs(totals.time_running_secs),
            totals.creatures_killed,
            totals.items_looted,
            totals.heals_used,
            totals.attacks_made
        );
        Ok(())
    }

    fn cmd_completions(shell: Shell) -> autohunt_core::Result<()> {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "autohunt", &mut std::io::stdout());
        Ok(())
    }
}

/// Resolve log level: --verbose > --quiet > --log-level > config
fn resolve_log_level<'a>(
    verbose: bool,
    quiet: bool,
    flag: Option<&'a str>,
    configured: &'a str,
) -> &'a str {
    if verbose {
        "debug"
    } else if quiet {
        "error"
    } else {
        flag.unwrap_or(configured)
    }
}

fn init_tracing(format: &str, log_level: &str) {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level))
    };

    if format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .json()
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_target(false)
            .init();
    }
}

fn open_store(path: &Path) -> autohunt_core::Result<SessionStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    SessionStore::open(path)
}

/// A controller driving the simulated game with dry-run actions.
fn build_controller(config: &AppConfig) -> Controller {
    let seed = config.hunt.as_ref().and_then(|h| h.timing.seed);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let mut game = SimulatedGame::new(seed).with_clock(Arc::clone(&clock));
    if let Some(hunt) = &config.hunt {
        if !hunt.targeting.creatures.is_empty() {
            game = game.with_creatures(hunt.targeting.creatures.iter().cloned());
        }
        if !hunt.targeting.loot.is_empty() {
            let items = hunt.targeting.loot.iter().chain(&hunt.targeting.discard);
            game = game.with_loot(items.cloned());
        }
    }

    let mut builder = Controller::builder(Arc::new(game), Arc::new(DryRunActuator))
        .clock(clock)
        .broadcaster(StatusBroadcaster::new(config.server.status_buffer));
    if let Some(seed) = seed {
        builder = builder.seed(seed);
    }
    if let Some(hunt) = &config.hunt {
        builder = builder.config(hunt.clone());
    }
    builder.build()
}

/// Hand an edited `[hunt]` section to the controller.
fn apply_reloaded_profile(controller: &Controller, reloaded: &AppConfig) {
    let Some(hunt) = &reloaded.hunt else {
        return;
    };
    if controller.configuration().as_ref() == Some(hunt) {
        debug!("hunt profile unchanged, nothing to apply");
        return;
    }
    match controller.load_configuration(hunt.clone()) {
        Ok(warnings) => {
            for w in &warnings {
                warn!("{}", w);
            }
            info!(profile = %hunt.name, "hunt profile reloaded");
        }
        Err(e) => warn!(error = %e, "reloaded hunt profile rejected"),
    }
}

/// Log the interesting status transitions for the operator.
fn spawn_status_logger(controller: &Controller) {
    let mut subscription = controller.subscribe_status();
    tokio::spawn(async move {
        while let Some(event) = subscription.recv().await {
            match event.kind {
                StatusKind::Tick => debug!(seq = event.seq, "tick"),
                StatusKind::EmergencyHalt => error!(
                    hp = event.game.hp_percent,
                    "emergency halt: HP under the logout threshold"
                ),
                StatusKind::RouteComplete => info!("route complete, walking disabled"),
                kind => info!(state = %event.run_state, event = kind.as_str(), "status changed"),
            }
        }
    });
}

fn print_session(record: &autohunt_core::SessionStats) {
    let ended = record
        .ended_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "running".into());
    let reason = record
        .end_reason
        .map(|r| format!("{r:?}").to_lowercase())
        .unwrap_or_default();
    println!(
        "  {} {} → {} {}",
        style(record.session_id).cyan(),
        record.created_at.format("%Y-%m-%d %H:%M:%S"),
        ended,
        style(reason).dim()
    );
    println!(
        "    {} running · {} kills · {} attacks · {} looted · {} discarded · {} heals · {} food",
        format_secs(record.time_running_secs),
        record.creatures_killed,
        record.attacks_made,
        record.items_looted,
        record.items_discarded,
        record.heals_used,
        record.food_used
    );
}

fn format_secs(secs: u64) -> String {
    format!("{}h{:02}m{:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Default configuration with a sample `[hunt]` profile, as TOML.
fn starter_config() -> autohunt_core::Result<String> {
    let config = AppConfig {
        hunt: Some(HuntConfig::default()),
        ..Default::default()
    };
    let body = toml::to_string_pretty(&config).map_err(|e| HuntError::Config(e.to_string()))?;
    Ok(format!(
        "# autohunt configuration\n# The [hunt] table is loaded into the decision loop at startup.\n\n{body}"
    ))
}
