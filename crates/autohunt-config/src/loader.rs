use autohunt_core::HuntError;
use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use parking_lot::RwLock;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::schema::AppConfig;

/// Loads and optionally hot-reloads the autohunt configuration.
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path: explicit path > AUTOHUNT_CONFIG env > ~/.autohunt/autohunt.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("AUTOHUNT_CONFIG") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".autohunt")
            .join("autohunt.toml")
    }

    /// Load the config from disk, falling back to defaults.
    pub fn load(path: Option<&Path>) -> autohunt_core::Result<Self> {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            Self::read(&config_path)?
        } else {
            warn!(?config_path, "config file not found, using defaults");
            AppConfig::default()
        };

        let config = Self::apply_env_overrides(config);

        // Validate config: log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(HuntError::Config(e));
            }
        }

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path,
        })
    }

    fn read(path: &Path) -> autohunt_core::Result<AppConfig> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str::<AppConfig>(&raw).map_err(|e| {
            HuntError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Get a read snapshot of the current config.
    pub fn get(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Path being watched.
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Apply env var overrides (AUTOHUNT_LISTEN, AUTOHUNT_LOG_LEVEL, ...)
    fn apply_env_overrides(mut config: AppConfig) -> AppConfig {
        if let Ok(v) = std::env::var("AUTOHUNT_LISTEN") {
            config.server.listen = v;
        }
        if let Ok(v) = std::env::var("AUTOHUNT_LOG_LEVEL") {
            config.logging.level = v;
        }
        if let Ok(v) = std::env::var("AUTOHUNT_DB") {
            config.storage.db_path = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("AUTOHUNT_SEED") {
            match (v.parse::<u64>(), config.hunt.as_mut()) {
                (Ok(seed), Some(hunt)) => hunt.timing.seed = Some(seed),
                (Err(_), _) => warn!(value = %v, "ignoring non-numeric AUTOHUNT_SEED"),
                (Ok(_), None) => {}
            }
        }
        config
    }

    /// Reload the config from disk.
    pub fn reload(&self) -> autohunt_core::Result<()> {
        if !self.config_path.exists() {
            return Err(HuntError::Config(format!(
                "config file not found: {}",
                self.config_path.display()
            )));
        }
        let new_config = Self::apply_env_overrides(Self::read(&self.config_path)?);
        new_config.validate().map_err(HuntError::Config)?;
        *self.config.write() = new_config;
        info!("configuration reloaded");
        Ok(())
    }

    /// Start a background file watcher that reloads the config when the file
    /// changes and hands every successfully parsed config to `on_reload`.
    /// Returns a handle to the watcher (must be kept alive for watching to continue).
    pub fn watch<F>(&self, on_reload: F) -> autohunt_core::Result<notify::RecommendedWatcher>
    where
        F: Fn(&AppConfig) + Send + 'static,
    {
        let config = Arc::clone(&self.config);
        let config_path = self.config_path.clone();

        info!(?config_path, "starting config file watcher");

        let path_for_event = config_path.clone();
        let mut watcher = notify::recommended_watcher(
            move |res: Result<NotifyEvent, notify::Error>| match res {
                Ok(event) => {
                    if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                        return;
                    }
                    let is_our_file = event
                        .paths
                        .iter()
                        .any(|p| p.file_name() == path_for_event.file_name());
                    if !is_our_file {
                        return;
                    }

                    info!("config file changed, reloading");
                    match ConfigLoader::read(&path_for_event) {
                        Ok(new_config) => {
                            let new_config = ConfigLoader::apply_env_overrides(new_config);
                            if let Err(e) = new_config.validate() {
                                warn!(error = %e, "config file has errors, keeping current config");
                                return;
                            }
                            on_reload(&new_config);
                            *config.write() = new_config;
                            info!("configuration hot-reloaded successfully");
                        }
                        Err(e) => {
                            warn!(error = %e, "config file has errors, keeping current config");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "file watcher error");
                }
            },
        )
        .map_err(|e| HuntError::Config(format!("failed to create file watcher: {}", e)))?;

        // Watch the parent directory (some editors create temp files + rename)
        let watch_path = self.config_path.parent().unwrap_or(Path::new("."));
        watcher
            .watch(watch_path, RecursiveMode::NonRecursive)
            .map_err(|e| HuntError::Config(format!("failed to watch config directory: {}", e)))?;

        Ok(watcher)
    }
}
