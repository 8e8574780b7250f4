//! Command line, environment and config file settings.
//!
//! Flags and their environment variables win over the config file, which wins over the defaults.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use matter_gateway::cache::MAX_CACHE_SIZE;
use serde::Deserialize;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 1883;
const DEFAULT_CLIENT_ID: &str = "matter-gateway";
const DEFAULT_KEEP_ALIVE_SECS: u64 = 30;
const DEFAULT_CACHE_PATH: &str = "matter-gateway.redb";

/// Bridges a Matter fabric to an MQTT broker
#[derive(Parser, Debug, Default)]
#[command(name = "server-mqtt")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// JSON file with `broker_config` and `client_config` sections
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Broker host name
    #[arg(long, env = "MQTT_HOST")]
    pub host: Option<String>,

    #[arg(long, env = "MQTT_PORT")]
    pub port: Option<u16>,

    /// Prefix of the MQTT client id, completed with the gateway MAC
    #[arg(long, env = "MQTT_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "MQTT_USERNAME")]
    pub username: Option<String>,

    #[arg(long, env = "MQTT_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Keep-alive interval in seconds
    #[arg(long, env = "MQTT_KEEP_ALIVE")]
    pub keep_alive: Option<u64>,

    /// MAC address that prefixes every gateway topic
    #[arg(long, env = "GATEWAY_MAC")]
    pub mac: Option<String>,

    /// Path of the node cache database
    #[arg(long, env = "GATEWAY_CACHE_PATH")]
    pub cache_path: Option<PathBuf>,

    /// Upper bound of the encoded node cache, in bytes
    #[arg(long, env = "GATEWAY_CACHE_MAX_SIZE")]
    pub cache_max_size: Option<usize>,

    /// Default log filter, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log as JSON lines
    #[arg(long, env = "GATEWAY_LOG_JSON")]
    pub log_json: bool,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct FileConfig {
    pub broker_config: BrokerConfig,
    pub client_config: ClientConfig,
    pub gateway_config: GatewayFileConfig,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct BrokerConfig {
    pub hostname: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub client_id: Option<String>,
    pub keep_alive: Option<u64>,
    pub clean_session: Option<bool>,
}

#[derive(Deserialize, Debug, Default, PartialEq)]
#[serde(default)]
pub struct GatewayFileConfig {
    pub mac: Option<String>,
    pub cache_path: Option<PathBuf>,
    pub cache_max_size: Option<usize>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub keep_alive: Duration,
    pub clean_session: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub broker: BrokerSettings,
    pub mac: String,
    pub cache_path: PathBuf,
    pub cache_max_size: usize,
}

impl Settings {
    pub fn from_args(args: &Args) -> Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(args, file)
    }

    fn merge(args: &Args, file: FileConfig) -> Result<Self> {
        let FileConfig {
            broker_config: broker,
            client_config: client,
            gateway_config: gateway,
        } = file;

        let mac = args
            .mac
            .clone()
            .or(gateway.mac)
            .context("the gateway MAC is required (--mac or GATEWAY_MAC)")?;
        let username = args.username.clone().or(broker.username);
        let password = args.password.clone().or(broker.password);
        let prefix = args
            .client_id
            .clone()
            .or(client.client_id)
            .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string());
        let keep_alive = args
            .keep_alive
            .or(client.keep_alive)
            .unwrap_or(DEFAULT_KEEP_ALIVE_SECS);

        Ok(Self {
            broker: BrokerSettings {
                host: args
                    .host
                    .clone()
                    .or(broker.hostname)
                    .unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: args.port.or(broker.port).unwrap_or(DEFAULT_PORT),
                client_id: format!("{prefix}-{mac}"),
                credentials: username.zip(password),
                keep_alive: Duration::from_secs(keep_alive),
                clean_session: client.clean_session.unwrap_or(true),
            },
            cache_path: args
                .cache_path
                .clone()
                .or(gateway.cache_path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_PATH)),
            cache_max_size: args
                .cache_max_size
                .or(gateway.cache_max_size)
                .unwrap_or(MAX_CACHE_SIZE),
            mac,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_override_file() {
        let file: FileConfig = serde_json::from_str(
            r#"{
                "broker_config": {"hostname": "broker.local", "port": 8883, "username": "u", "password": "p"},
                "client_config": {"clean_session": false},
                "gateway_config": {"mac": "aa:bb"}
            }"#,
        )
        .unwrap();
        let args = Args {
            port: Some(1884),
            ..Default::default()
        };
        let settings = Settings::merge(&args, file).unwrap();
        assert_eq!(settings.broker.host, "broker.local");
        assert_eq!(settings.broker.port, 1884);
        assert_eq!(
            settings.broker.credentials,
            Some(("u".to_string(), "p".to_string()))
        );
        assert!(!settings.broker.clean_session);
        assert_eq!(settings.broker.client_id, "matter-gateway-aa:bb");
        assert_eq!(settings.mac, "aa:bb");
        assert_eq!(settings.cache_max_size, MAX_CACHE_SIZE);
    }

    #[test]
    fn test_mac_is_required() {
        assert!(Settings::merge(&Args::default(), FileConfig::default()).is_err());
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from(["server-mqtt", "--mac", "aa", "--log-json"]);
        assert_eq!(args.mac.as_deref(), Some("aa"));
        assert!(args.log_json);
        assert_eq!(args.log_level, "info");
    }
}
