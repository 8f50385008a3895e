use anyhow::{anyhow, Result};
use directories::ProjectDirs;
use prodent_client::{ServiceConfig, SessionConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const URL_ENV: &str = "PRODENT_SUPABASE_URL";
pub const ANON_KEY_ENV: &str = "PRODENT_SUPABASE_ANON_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "prodent", "prodent")
            .ok_or_else(|| anyhow!("Could not determine config directory"))
    }

    pub fn config_path() -> Result<PathBuf> {
        let proj_dirs = Self::project_dirs()?;
        let config_dir = proj_dirs.config_dir();
        std::fs::create_dir_all(config_dir)?;

        Ok(config_dir.join("config.toml"))
    }

    /// Where the signed-in session is kept between runs
    pub fn session_path() -> Result<PathBuf> {
        let proj_dirs = Self::project_dirs()?;
        Ok(proj_dirs.data_dir().join("session.json"))
    }

    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Service settings; command line beats environment beats config file
    pub fn service(&self, url_override: Option<String>) -> Result<ServiceConfig> {
        let url = url_override
            .or_else(|| std::env::var(URL_ENV).ok())
            .or_else(|| self.remote.url.clone())
            .ok_or_else(|| {
                anyhow!(
                    "No service URL configured. Set {} or run 'prodent config set url <URL>'",
                    URL_ENV
                )
            })?;
        let anon_key = std::env::var(ANON_KEY_ENV)
            .ok()
            .or_else(|| self.remote.anon_key.clone())
            .ok_or_else(|| {
                anyhow!(
                    "No API key configured. Set {} or run 'prodent config set anon_key <KEY>'",
                    ANON_KEY_ENV
                )
            })?;

        let mut service = ServiceConfig::new(url, anon_key);
        if let Some(secs) = self.remote.request_timeout_secs {
            service.request_timeout_secs = secs;
        }
        Ok(service)
    }
}
