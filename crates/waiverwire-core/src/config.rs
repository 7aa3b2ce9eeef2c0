// Configuration loading and parsing (league.toml, waivers.toml).

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::ids::TeamId;
use crate::lineup::SchedulingPeriod;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub league: LeagueConfig,
    pub resolution: ResolutionConfig,
    pub ws_port: u16,
    /// As written in waivers.toml; see [`Config::database_path`].
    pub db_path: String,
    pub data_paths: DataPaths,
}

impl Config {
    /// The period lineups start in before an administrator sets one.
    pub fn default_period(&self) -> SchedulingPeriod {
        SchedulingPeriod::new(self.league.season, self.league.start_week)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.resolution.busy_timeout_ms)
    }

    /// Where the database lives. An empty `database.path` means
    /// `waiverwire.db` in the platform data directory.
    pub fn database_path(&self) -> PathBuf {
        if !self.db_path.trim().is_empty() {
            return PathBuf::from(&self.db_path);
        }
        match directories::ProjectDirs::from("", "", "waiverwire") {
            Some(dirs) => dirs.data_dir().join("waiverwire.db"),
            None => PathBuf::from("waiverwire.db"),
        }
    }

    /// Display name for a team, if league.toml gives one.
    pub fn team_name(&self, team: TeamId) -> Option<&str> {
        self.league.teams.get(&team.to_string()).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// league.toml structs
// ---------------------------------------------------------------------------

/// Wrapper for the top-level `[league]` table in league.toml.
#[derive(Debug, Clone, Deserialize)]
struct LeagueFile {
    league: LeagueConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LeagueConfig {
    pub name: String,
    pub num_teams: usize,
    pub season: u16,
    pub start_week: u8,
    /// Team display names keyed by team id (optional).
    #[serde(default)]
    pub teams: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// waivers.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire waivers.toml file.
#[derive(Debug, Clone, Deserialize)]
struct WaiversFile {
    resolution: ResolutionConfig,
    websocket: WebsocketSection,
    database: DatabaseSection,
    #[serde(default)]
    data: DataPaths,
}

#[derive(Debug, Clone, Deserialize)]
struct WebsocketSection {
    port: u16,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    #[serde(default)]
    path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResolutionConfig {
    pub busy_timeout_ms: u64,
    pub default_actor: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DataPaths {
    /// Roster CSV imported at startup into an empty database.
    #[serde(default)]
    pub rosters: Option<String>,
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/league.toml` and
/// `config/waivers.toml`, relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- league.toml (required) ---
    let league_path = config_dir.join("league.toml");
    let league_text = read_file(&league_path)?;
    let league_file: LeagueFile =
        toml::from_str(&league_text).map_err(|e| ConfigError::ParseError {
            path: league_path.clone(),
            source: e,
        })?;

    // --- waivers.toml (required) ---
    let waivers_path = config_dir.join("waivers.toml");
    let waivers_text = read_file(&waivers_path)?;
    let waivers_file: WaiversFile =
        toml::from_str(&waivers_text).map_err(|e| ConfigError::ParseError {
            path: waivers_path.clone(),
            source: e,
        })?;

    let config = Config {
        league: league_file.league,
        resolution: waivers_file.resolution,
        ws_port: waivers_file.websocket.port,
        db_path: waivers_file.database.path,
        data_paths: waivers_file.data,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    let mut copied = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let league = &config.league;
    if league.num_teams == 0 {
        return Err(invalid("league.num_teams", "must be greater than 0"));
    }
    if league.season < 2000 {
        return Err(invalid(
            "league.season",
            format!("must be 2000 or later, got {}", league.season),
        ));
    }
    if !(1..=18).contains(&league.start_week) {
        return Err(invalid(
            "league.start_week",
            format!("must be between 1 and 18, got {}", league.start_week),
        ));
    }
    for key in league.teams.keys() {
        match key.parse::<usize>() {
            Ok(id) if (1..=league.num_teams).contains(&id) => {}
            _ => {
                return Err(invalid(
                    "league.teams",
                    format!("`{key}` is not a team id between 1 and {}", league.num_teams),
                ))
            }
        }
    }

    if config.resolution.busy_timeout_ms == 0 {
        return Err(invalid("resolution.busy_timeout_ms", "must be greater than 0"));
    }
    if config.resolution.default_actor.trim().is_empty() {
        return Err(invalid("resolution.default_actor", "must not be empty"));
    }
    if config.ws_port == 0 {
        return Err(invalid("websocket.port", "must not be 0"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
