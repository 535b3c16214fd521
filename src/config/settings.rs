use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{Result, ServiceError};
use crate::store::{Catalog, Tariff};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub shim: ShimConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
    #[serde(default)]
    pub uploads: UploadsConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    /// Overrides the built-in tariff catalog when present.
    #[serde(default)]
    pub tariffs: Option<Vec<Tariff>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: String,
    pub slot: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: "data".to_string(),
            slot: "catalyst_club_data".to_string(),
        }
    }
}

/// What the shim does with a request it has no route for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownRoutePolicy {
    /// Perform the real network request.
    Passthrough,
    /// Answer `404 {error}` without touching the network.
    Reject,
}

impl Default for UnknownRoutePolicy {
    fn default() -> Self {
        Self::Passthrough
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShimConfig {
    pub unknown_route: UnknownRoutePolicy,
    /// Substrings that mark a URL as belonging to the mocked API.
    pub intercept: Vec<String>,
    pub passthrough_timeout_secs: u64,
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self {
            unknown_route: UnknownRoutePolicy::default(),
            intercept: vec![
                "/api/".to_string(),
                "localhost:8000".to_string(),
                "acqu1red.github.io".to_string(),
            ],
            passthrough_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaymentsConfig {
    pub checkout_base_url: String,
    pub invoice_prefix: String,
    pub default_method: String,
}

impl Default for PaymentsConfig {
    fn default() -> Self {
        Self {
            checkout_base_url: "https://lava.top/pay/".to_string(),
            invoice_prefix: "lava_".to_string(),
            default_method: "card".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadsConfig {
    pub url_prefix: String,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            url_prefix: "/uploads/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationMode {
    None,
    Log,
    Webhook,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub mode: NotificationMode,
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            mode: NotificationMode::None,
            webhook_url: None,
            timeout_secs: 3,
        }
    }
}

impl Settings {
    /// Loads the first config file found; no file at all means built-in defaults.
    pub fn load() -> Result<Self> {
        match Self::find_config_file() {
            Some(path) => Self::load_from(&path),
            None => {
                tracing::info!("No config file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let config_content = std::fs::read_to_string(path)?;
        let settings = Self::parse(&config_content)?;
        tracing::info!("Loaded configuration from {}", path);
        Ok(settings)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|e| ServiceError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn catalog(&self) -> Catalog {
        match &self.tariffs {
            Some(tariffs) => Catalog {
                tariffs: tariffs.clone(),
            },
            None => Catalog::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.notifications.mode == NotificationMode::Webhook
            && self
                .notifications
                .webhook_url
                .as_deref()
                .is_none_or(|u| u.trim().is_empty())
        {
            return Err(ServiceError::Config(
                "notifications.webhook_url is required when mode = \"webhook\"".into(),
            ));
        }
        if let Some(tariffs) = &self.tariffs {
            if tariffs.is_empty() {
                return Err(ServiceError::Config("tariffs must not be empty".into()));
            }
        }
        Ok(())
    }

    // An explicit MINIAPP_CONFIG wins over files in the working directory.
    fn find_config_file() -> Option<String> {
        Self::find_config_file_from(std::env::var("MINIAPP_CONFIG").ok())
    }

    fn find_config_file_from(explicit: Option<String>) -> Option<String> {
        if let Some(path) = explicit.filter(|p| !p.trim().is_empty()) {
            if Path::new(&path).exists() {
                return Some(path);
            }
            tracing::warn!("MINIAPP_CONFIG points to missing file {}", path);
        }

        let possible_names = ["custom-config.toml", "config.toml"];

        for name in &possible_names {
            if Path::new(name).exists() {
                return Some(name.to_string());
            }
        }
        None
    }
}
