//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! Service settings (`[sessions]` section of the same TOML file) are optional;
//! every field has a default so a missing file still yields a usable config.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable consulted for the root folder
pub const ROOT_ENV_VAR: &str = "STUDIO_ROOT";

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "studio.db";

/// Default HTTP port for the sessions service
pub const DEFAULT_PORT: u16 = 5740;

/// Deployment environment
///
/// Production masks internal error messages in HTTP 500 responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl std::str::FromStr for Environment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(Error::Config(format!("Unknown environment: {}", other))),
        }
    }
}

/// `[sessions]` section of the config file
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub bind_address: String,
    pub port: u16,
    pub environment: Environment,
    /// When set, notifications are POSTed here as JSON instead of only logged
    pub notification_webhook_url: Option<String>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            environment: Environment::Development,
            notification_webhook_url: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    root_folder: Option<String>,
    #[serde(default)]
    sessions: Option<ServiceConfig>,
}

/// Resolve the root folder holding the database
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    if let Ok(config_path) = find_config_file() {
        if let Ok(config) = read_config_file(&config_path) {
            if let Some(root_folder) = config.root_folder {
                return PathBuf::from(root_folder);
            }
        }
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// Path of the database file inside `root_folder`, creating the folder if needed
pub fn prepare_database_path(root_folder: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(root_folder)?;
    Ok(root_folder.join(DATABASE_FILE))
}

/// Load the `[sessions]` section from the platform config file
///
/// Returns defaults when no config file exists. A config file that exists but
/// fails to parse is an error.
pub fn load_service_config() -> Result<ServiceConfig> {
    match find_config_file() {
        Ok(path) => load_service_config_from(&path),
        Err(_) => Ok(ServiceConfig::default()),
    }
}

/// Load the `[sessions]` section from an explicit file
pub fn load_service_config_from(path: &Path) -> Result<ServiceConfig> {
    let config = read_config_file(path)?;
    Ok(config.sessions.unwrap_or_default())
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

fn parse_config(content: &str) -> Result<ConfigFile> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
}

/// Get configuration file path for the platform
fn find_config_file() -> Result<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("studio").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/studio/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }
    }

    Err(Error::Config("No config file found".to_string()))
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("studio"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/studio"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("studio"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/studio"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("studio"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\studio"))
    } else {
        PathBuf::from("./studio_data")
    }
}
