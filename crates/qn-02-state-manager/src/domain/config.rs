//! Server configuration with validation.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ManagerError;

/// Default number of clients the server waits for.
pub const DEFAULT_CLIENT_NUM: usize = 4;

/// Default idle tick of the dispatcher.
pub const DEFAULT_TICK_MS: u64 = 1_000;

/// State manager server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address
    pub ip: IpAddr,
    /// Bind port (0 picks an ephemeral port)
    pub port: u16,
    /// Connections accepted before dispatching starts
    pub client_num: usize,
    /// Idle tick of the dispatcher in milliseconds
    pub tick_ms: u64,
    /// Optional file receiving the per-type timing summary at shutdown
    pub timing_log: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            client_num: DEFAULT_CLIENT_NUM,
            tick_ms: DEFAULT_TICK_MS,
            timing_log: None,
        }
    }
}

impl ServerConfig {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self {
            ip,
            port,
            ..Self::default()
        }
    }

    /// Load from environment variables, falling back to defaults.
    ///
    /// Reads `QN_SERVER_IP`, `QN_SERVER_PORT`, `QN_CLIENT_NUM`, `QN_TICK_MS`
    /// and `QN_TIMING_LOG`.
    pub fn from_env() -> Result<Self, ManagerError> {
        let mut config = Self::default();
        if let Some(ip) = env_parse("QN_SERVER_IP")? {
            config.ip = ip;
        }
        if let Some(port) = env_parse("QN_SERVER_PORT")? {
            config.port = port;
        }
        if let Some(client_num) = env_parse("QN_CLIENT_NUM")? {
            config.client_num = client_num;
        }
        if let Some(tick_ms) = env_parse("QN_TICK_MS")? {
            config.tick_ms = tick_ms;
        }
        if let Ok(path) = std::env::var("QN_TIMING_LOG") {
            if !path.is_empty() {
                config.timing_log = Some(PathBuf::from(path));
            }
        }
        Ok(config)
    }

    pub fn with_client_num(mut self, client_num: usize) -> Self {
        self.client_num = client_num;
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick_ms = tick.as_millis().try_into().unwrap_or(u64::MAX);
        self
    }

    pub fn with_timing_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.timing_log = Some(path.into());
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ManagerError> {
        if self.client_num == 0 {
            return Err(ManagerError::Config("client_num cannot be 0".into()));
        }
        if self.tick_ms == 0 {
            return Err(ManagerError::Config("tick_ms cannot be 0".into()));
        }
        Ok(())
    }

    /// Get server bind address
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>, ManagerError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| ManagerError::Config(format!("{name}={raw}: {e}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.client_num, 4);
        assert_eq!(config.tick(), Duration::from_secs(1));
    }

    #[test]
    fn test_zero_clients_rejected() {
        let config = ServerConfig::default().with_client_num(0);
        assert!(matches!(config.validate(), Err(ManagerError::Config(_))));
    }

    #[test]
    fn test_zero_tick_rejected() {
        let config = ServerConfig::default().with_tick(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_socket_addr() {
        let config = ServerConfig::new("127.0.0.1".parse().unwrap(), 6789);
        assert_eq!(config.socket_addr().to_string(), "127.0.0.1:6789");
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"port": 7000, "timing_log": "server.log"}"#).unwrap();
        assert_eq!(config.port, 7000);
        assert_eq!(config.client_num, DEFAULT_CLIENT_NUM);
        assert_eq!(config.timing_log, Some(PathBuf::from("server.log")));
    }
}
