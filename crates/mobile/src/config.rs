//! Mobile client configuration.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not resolve an application data directory")]
    NoDataDir,
}

/// Configuration for the mobile client runtime.
#[derive(Debug, Clone)]
pub struct MobileConfig {
    /// Base URL of the platform API, without a trailing slash.
    pub api_url: String,
    /// Bearer token for authenticated calls, when already logged in.
    pub auth_token: Option<String>,
    /// Location of the local SQLite database.
    pub db_path: PathBuf,
}

impl MobileConfig {
    /// Build configuration from the environment:
    /// `FIELDSERVE_API_URL`, `FIELDSERVE_AUTH_TOKEN`, `FIELDSERVE_DB_PATH`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("FIELDSERVE_API_URL")
            .unwrap_or_else(|_| "http://localhost:8080".to_string());
        let auth_token = std::env::var("FIELDSERVE_AUTH_TOKEN").ok();
        let db_path = match std::env::var("FIELDSERVE_DB_PATH") {
            Ok(path) => PathBuf::from(path),
            Err(_) => default_db_path()?,
        };

        Ok(Self {
            api_url,
            auth_token,
            db_path,
        })
    }
}

/// Resolve the default path of the SQLite database:
/// `{app_data_dir}/fieldserve/mobile.db`.
fn default_db_path() -> Result<PathBuf, ConfigError> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .ok_or(ConfigError::NoDataDir)?;

    let mut path = base;
    path.push("fieldserve");
    path.push("mobile.db");
    Ok(path)
}
