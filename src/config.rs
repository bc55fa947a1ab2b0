// =============================================================================
// Application Configuration
// =============================================================================
//
// Loaded from a JSON file at startup. Every field carries `#[serde(default)]`
// so that adding new fields never breaks loading an older config file;
// environment overrides are applied in main.rs.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::binance::client::DEFAULT_REST_BASE_URL;

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_symbols() -> Vec<String> {
    vec![
        "BTCUSDT".to_string(),
        "ETHUSDT".to_string(),
        "BNBUSDT".to_string(),
    ]
}

fn default_interval() -> String {
    "1m".to_string()
}

fn default_rest_base_url() -> String {
    DEFAULT_REST_BASE_URL.to_string()
}

fn default_ws_base_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_kline_limit() -> u32 {
    100
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Address the local API server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Symbols whose kline streams are opened at startup.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Kline interval used for the startup streams and as the subscribe
    /// default.
    #[serde(default = "default_interval")]
    pub default_interval: String,

    /// Base URL of the public market-data REST API.
    #[serde(default = "default_rest_base_url")]
    pub rest_base_url: String,

    /// Base URL of the upstream WebSocket endpoint, up to and including
    /// `/ws`.
    #[serde(default = "default_ws_base_url")]
    pub ws_base_url: String,

    /// Default number of candles fetched for indicator queries.
    #[serde(default = "default_kline_limit")]
    pub default_kline_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            symbols: default_symbols(),
            default_interval: default_interval(),
            rest_base_url: default_rest_base_url(),
            ws_base_url: default_ws_base_url(),
            default_kline_limit: default_kline_limit(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a JSON file at `path`. A missing file is an
    /// error so the caller can fall back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            bind_addr = %config.bind_addr,
            "config loaded"
        );

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
        assert_eq!(cfg.symbols, vec!["BTCUSDT", "ETHUSDT", "BNBUSDT"]);
        assert_eq!(cfg.default_interval, "1m");
        assert_eq!(cfg.default_kline_limit, 100);
        assert!(cfg.ws_base_url.ends_with("/ws"));
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
        assert_eq!(cfg.default_interval, "1m");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbols": ["SOLUSDT"], "default_interval": "5m" }"#;
        let cfg: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols, vec!["SOLUSDT"]);
        assert_eq!(cfg.default_interval, "5m");
        assert_eq!(cfg.default_kline_limit, 100);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = AppConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.symbols, cfg2.symbols);
        assert_eq!(cfg.bind_addr, cfg2.bind_addr);
    }
}
