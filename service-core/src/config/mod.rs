use crate::error::AppError;
use config::{Config as Cfg, File};
use serde::Deserialize;
use serde::de::DeserializeOwned;

/// Settings shared by every binary in the workspace.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
}

fn default_service_name() -> String {
    "invoice-engine".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load() -> Result<Self, AppError> {
        load_section("configuration", "APP")
    }
}

/// Load a settings section from an optional config file layered under
/// `PREFIX__KEY` environment variables.
pub fn load_section<T: DeserializeOwned>(file: &str, env_prefix: &str) -> Result<T, AppError> {
    dotenvy::dotenv().ok();

    let config = Cfg::builder()
        .add_source(File::with_name(file).required(false))
        .add_source(config::Environment::with_prefix(env_prefix).separator("__"))
        .build()?;

    Ok(config.try_deserialize()?)
}
