use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use stream_resolver::ProviderSettings;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Serialize config failed: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_provider_mirrors")]
    pub provider_mirrors: Vec<String>,
    #[serde(default = "default_init_retry_secs")]
    pub init_retry_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_relay_referer")]
    pub relay_referer: String,
    #[serde(default = "default_relay_origin")]
    pub relay_origin: String,
    #[serde(default = "default_embed_base_url")]
    pub embed_base_url: String,
    #[serde(default = "default_anilist_endpoint")]
    pub anilist_endpoint: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<String>,
}

fn default_listen_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_provider() -> String {
    "animepahe".to_string()
}

fn default_provider_mirrors() -> Vec<String> {
    vec![
        "https://animepahe.ru".to_string(),
        "https://animepahe.com".to_string(),
        "https://animepahe.org".to_string(),
    ]
}

fn default_init_retry_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36".to_string()
}

fn default_relay_referer() -> String {
    "https://animepahe.com/".to_string()
}

fn default_relay_origin() -> String {
    "https://animepahe.com".to_string()
}

fn default_embed_base_url() -> String {
    "https://animepahe.com/play/".to_string()
}

fn default_anilist_endpoint() -> String {
    "https://graphql.anilist.co".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            provider: default_provider(),
            provider_mirrors: default_provider_mirrors(),
            init_retry_secs: default_init_retry_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
            relay_referer: default_relay_referer(),
            relay_origin: default_relay_origin(),
            embed_base_url: default_embed_base_url(),
            anilist_endpoint: default_anilist_endpoint(),
            log_level: default_log_level(),
            log_file: None,
        }
    }
}

impl Config {
    /// Load config from `path`. A missing file yields the defaults, which are
    /// written back so they can be edited; a malformed file is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Config::default();
                if let Err(e) = config.save(path) {
                    eprintln!("Failed to write default config to {}: {}", path.display(), e);
                }
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string(&self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Replace the port of `listen_addr`, keeping its host
    pub fn set_port(&mut self, port: u16) {
        let host = match self.listen_addr.parse::<SocketAddr>() {
            Ok(addr) => addr.ip().to_string(),
            Err(_) => self
                .listen_addr
                .rsplit_once(':')
                .map(|(host, _)| host.to_string())
                .unwrap_or_else(|| "0.0.0.0".to_string()),
        };
        self.listen_addr = if host.contains(':') && !host.starts_with('[') {
            format!("[{}]:{}", host, port)
        } else {
            format!("{}:{}", host, port)
        };
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn init_retry_delay(&self) -> Duration {
        Duration::from_secs(self.init_retry_secs)
    }

    pub fn provider_settings(&self) -> ProviderSettings {
        ProviderSettings {
            mirrors: self.provider_mirrors.clone(),
            timeout: self.request_timeout(),
            user_agent: self.user_agent.clone(),
            embed_base_url: self.embed_base_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            listen_addr = "127.0.0.1:8080"
            provider_mirrors = ["https://animepahe.si"]
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:8080");
        assert_eq!(config.provider_mirrors, vec!["https://animepahe.si"]);
        assert_eq!(config.init_retry_secs, 5);
        assert_eq!(config.relay_referer, "https://animepahe.com/");
        assert!(config.log_file.is_none());
    }

    #[test]
    fn test_set_port_keeps_host() {
        let mut config = Config::default();
        config.set_port(8080);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");

        config.listen_addr = "[::1]:3001".to_string();
        config.set_port(9000);
        assert_eq!(config.listen_addr, "[::1]:9000");

        config.listen_addr = "localhost:3001".to_string();
        config.set_port(9001);
        assert_eq!(config.listen_addr, "localhost:9001");
    }

    #[test]
    fn test_missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("relay.toml");

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        let reloaded = Config::load(&path).unwrap();
        assert_eq!(reloaded, config);
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "listen_addr = [").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }
}
