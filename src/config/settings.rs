use crate::monitoring::event_store::ServicePorts;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/netmon.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Addresses the streaming reconstruction reports on.
    pub focus_addresses: Vec<String>,
    pub http_ports: Vec<u16>,
    pub https_ports: Vec<u16>,
    pub log_level: String,
    /// Bounded ingestion channel when set, unbounded otherwise.
    pub channel_capacity: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            focus_addresses: Vec::new(),
            http_ports: vec![80],
            https_ports: vec![443],
            log_level: "info".to_string(),
            channel_capacity: None,
        }
    }
}

impl Config {
    pub fn service_ports(&self) -> ServicePorts {
        ServicePorts {
            http: self.http_ports.clone(),
            https: self.https_ports.clone(),
        }
    }

    pub fn level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or_else(|_| {
            log::warn!("Unknown log level '{}', using info", self.log_level);
            log::LevelFilter::Info
        })
    }
}

pub fn load_config() -> Config {
    load_config_from(DEFAULT_CONFIG_PATH)
}

pub fn load_config_from(config_path: impl AsRef<Path>) -> Config {
    let config_path = config_path.as_ref();

    if config_path.exists() {
        match fs::read_to_string(config_path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    log::info!("Loaded configuration from {}", config_path.display());
                    return config;
                }
                Err(e) => {
                    log::warn!("Failed to parse config file: {}. Using defaults.", e);
                }
            },
            Err(e) => {
                log::warn!("Failed to read config file: {}. Using defaults.", e);
            }
        }
    }

    log::info!("Using default configuration");
    Config::default()
}

pub fn save_config(config: &Config, config_path: impl AsRef<Path>) -> anyhow::Result<()> {
    let config_path = config_path.as_ref();
    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)?;
    fs::write(config_path, content)?;
    Ok(())
}
