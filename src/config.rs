use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub portal: PortalConfig,
    #[serde(default)]
    pub token: TokenConfig,
    #[serde(default)]
    pub zooniverse: ZooniverseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PortalConfig {
    /// Base URL of the ESAP gateway backend.
    pub host: String,
    #[serde(default = "default_basket_endpoint")]
    pub basket_endpoint: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TokenConfig {
    /// Audience key looked up in the hub's exchanged-token map.
    #[serde(default = "default_audience")]
    pub audience: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            audience: default_audience(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ZooniverseConfig {
    #[serde(default = "default_panoptes_host")]
    pub api_host: String,
}

impl Default for ZooniverseConfig {
    fn default() -> Self {
        Self {
            api_host: default_panoptes_host(),
        }
    }
}

fn default_basket_endpoint() -> String {
    "esap-api/accounts/user-profiles/".to_string()
}

fn default_audience() -> String {
    "rucio".to_string()
}

fn default_panoptes_host() -> String {
    "https://www.zooniverse.org".to_string()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub(crate) fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if config.portal.host.trim().is_empty() {
        anyhow::bail!("portal.host must not be empty");
    }
    if !config.portal.host.starts_with("http://") && !config.portal.host.starts_with("https://") {
        anyhow::bail!(
            "portal.host must be an http(s) URL, got '{}'",
            config.portal.host
        );
    }
    if config.token.audience.trim().is_empty() {
        anyhow::bail!("token.audience must not be empty");
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let config = parse_config("[portal]\nhost = \"https://sdc.esap.example\"\n").unwrap();
        assert_eq!(config.portal.basket_endpoint, "esap-api/accounts/user-profiles/");
        assert_eq!(config.token.audience, "rucio");
        assert_eq!(config.zooniverse.api_host, "https://www.zooniverse.org");
    }

    #[test]
    fn rejects_non_http_host() {
        assert!(parse_config("[portal]\nhost = \"sdc.esap.example\"\n").is_err());
        assert!(parse_config("[portal]\nhost = \"\"\n").is_err());
    }
}
