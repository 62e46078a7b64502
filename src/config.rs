//! Application configuration management.
//!
//! Configuration is stored at `~/.config/carebook/config.json` and can be
//! overridden through `CAREBOOK_*` environment variables (the environment
//! wins over the file). The persisted session lives separately under the
//! platform data directory.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "carebook";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Persisted session file name
const SESSION_FILE: &str = "session.json";

/// Default API base URL. Override with `CAREBOOK_API_URL` for staging or
/// local backends.
const DEFAULT_API_BASE_URL: &str = "https://api.carebook.health/api";

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Surface server-echoed OTP codes in operation outcomes. Debug
    /// deployments of the backend include the code in the send-otp
    /// response; production configs leave this off so it is never shown.
    #[serde(default)]
    pub expose_debug_otp: bool,
    #[serde(default)]
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            expose_debug_otp: false,
            last_email: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("CAREBOOK_API_URL") {
            if !url.trim().is_empty() {
                self.api_base_url = url;
            }
        }
        if let Ok(flag) = std::env::var("CAREBOOK_DEBUG_OTP") {
            self.expose_debug_otp = matches!(flag.trim(), "1" | "true" | "yes");
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where the token store keeps the signed-in session.
    pub fn session_path() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME).join(SESSION_FILE))
    }
}
