use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Blog platform API base URL
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,

    /// OAuth client id handed to the external Google sign-in flow
    #[serde(default)]
    pub google_client_id: Option<String>,

    /// OAuth client id handed to the external LinkedIn sign-in flow
    #[serde(default)]
    pub linkedin_client_id: Option<String>,

    /// Override for the session file location (defaults to the platform
    /// data directory)
    #[serde(default)]
    pub session_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            google_client_id: None,
            linkedin_client_id: None,
            session_file: None,
        }
    }
}

impl ClientConfig {
    /// Loads configuration from the TOML file at `INKPOST_CONFIG` or the
    /// platform config dir, falling back to environment variables when no
    /// file exists.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os("INKPOST_CONFIG")
            .map(PathBuf::from)
            .or_else(Self::default_path);

        if let Some(path) = path {
            if path.exists() {
                let raw = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config file {}", path.display()))?;
                return toml::from_str(&raw)
                    .with_context(|| format!("invalid config file {}", path.display()));
            }
        }
        Ok(Self::from_env())
    }

    pub fn from_env() -> Self {
        Self {
            api_base_url: std::env::var("INKPOST_API_URL").unwrap_or_else(|_| default_api_base_url()),
            google_client_id: std::env::var("INKPOST_GOOGLE_CLIENT_ID").ok(),
            linkedin_client_id: std::env::var("INKPOST_LINKEDIN_CLIENT_ID").ok(),
            session_file: None,
        }
    }

    fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("inkpost").join("config.toml"))
    }
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8000".to_string()
}
