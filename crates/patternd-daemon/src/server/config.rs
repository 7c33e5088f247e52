//! Server configuration.

use std::net::SocketAddr;

use patternd_core::config::ServerSettings;

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// TCP bind address.
    pub addr: SocketAddr,

    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

impl ServerConfig {
    pub const fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            addr: settings.addr,
            max_body_bytes: settings.max_body_bytes,
        }
    }

    /// Set the request body limit.
    #[must_use]
    pub const fn with_max_body_bytes(mut self, max: usize) -> Self {
        self.max_body_bytes = max;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.addr.port(), 8080);
        assert_eq!(config.max_body_bytes, 1024 * 1024);
    }

    #[test]
    fn from_settings_and_body_limit() {
        let addr: SocketAddr = "0.0.0.0:9000".parse().unwrap();
        let settings = ServerSettings {
            addr,
            ..ServerSettings::default()
        };
        let config = ServerConfig::from_settings(&settings).with_max_body_bytes(64);
        assert_eq!(config.addr, addr);
        assert_eq!(config.max_body_bytes, 64);
    }
}
