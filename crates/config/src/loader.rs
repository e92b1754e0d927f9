//! Config discovery and loading.

use std::{
    path::{Path, PathBuf},
    sync::RwLock,
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::CourierConfig};

static CONFIG_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);
static DATA_DIR_OVERRIDE: RwLock<Option<PathBuf>> = RwLock::new(None);

/// Override the config directory (CLI flag / tests).
pub fn set_config_dir(dir: PathBuf) {
    if let Ok(mut guard) = CONFIG_DIR_OVERRIDE.write() {
        *guard = Some(dir);
    }
}

/// Override the data directory (CLI flag / tests).
pub fn set_data_dir(dir: PathBuf) {
    if let Ok(mut guard) = DATA_DIR_OVERRIDE.write() {
        *guard = Some(dir);
    }
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Directory searched for `courier.toml` after the working directory.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Ok(guard) = CONFIG_DIR_OVERRIDE.read()
        && let Some(dir) = guard.as_ref()
    {
        return dir.clone();
    }
    home_dir().join(".config").join("courier")
}

/// Directory holding the SQLite database and stored media.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Ok(guard) = DATA_DIR_OVERRIDE.read()
        && let Some(dir) = guard.as_ref()
    {
        return dir.clone();
    }
    home_dir().join(".local").join("share").join("courier")
}

/// Load `courier.toml` from the working directory or the config directory.
/// Missing or unreadable files fall back to defaults; a malformed file is a
/// warning, not a startup failure.
#[must_use]
pub fn discover_and_load() -> CourierConfig {
    let candidates = [PathBuf::from("courier.toml"), config_dir().join("courier.toml")];

    for path in &candidates {
        if path.is_file() {
            debug!(path = %path.display(), "loading config file");
            match load_file(path) {
                Ok(config) => return apply_env_overrides(config),
                Err(e) => warn!(path = %path.display(), error = %e, "failed to load config file"),
            }
        }
    }

    apply_env_overrides(CourierConfig::default())
}

fn load_file(path: &Path) -> Result<CourierConfig, toml::de::Error> {
    let raw = std::fs::read_to_string(path).unwrap_or_default();
    toml::from_str(&substitute_env(&raw))
}

/// Apply environment-variable overrides on top of a loaded config.
#[must_use]
pub fn apply_env_overrides(mut config: CourierConfig) -> CourierConfig {
    if let Ok(bind) = std::env::var("COURIER_BIND") {
        config.server.bind = bind;
    }
    if let Ok(port) = std::env::var("COURIER_PORT")
        && let Ok(port) = port.parse()
    {
        config.server.port = port;
    }
    if let Ok(url) = std::env::var("DATABASE_URL") {
        config.database.url = Some(url);
    }
    if let Ok(key) = std::env::var("COURIER_INTERNAL_API_KEY") {
        config.automation.internal_api_key = Some(key);
    }
    if let Ok(base) = std::env::var("AUTOMATION_WEBHOOK_BASE") {
        config.automation.webhook_base = Some(base);
    }
    config
}

/// Resolve the database URL, defaulting to a file under the data dir.
#[must_use]
pub fn database_url(config: &CourierConfig) -> String {
    config.database.url.clone().unwrap_or_else(|| {
        format!(
            "sqlite:{}?mode=rwc",
            data_dir().join("courier.db").display()
        )
    })
}
