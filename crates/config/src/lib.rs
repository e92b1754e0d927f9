//! Configuration loading, validation, and env substitution.
//!
//! Config file: `courier.toml`, searched in `./` then `~/.config/courier/`.
//! Supports `${ENV_VAR}` substitution in all string values, plus a small set
//! of environment overrides applied after loading.

pub mod env_subst;
pub mod loader;
pub mod schema;

pub use {
    loader::{
        apply_env_overrides, config_dir, data_dir, database_url, discover_and_load, set_config_dir,
        set_data_dir,
    },
    schema::{
        AutomationConfig, CourierConfig, DatabaseConfig, HandoffConfig, MediaConfig, ServerConfig,
    },
};
