//! Configuration system.
//!
//! Loads server configuration from JSON strings (file IO left to the app).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_ip")]
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Origins allowed to open a websocket.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    /// Broadcast period in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
}

fn default_ip() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_allowed_origins() -> Vec<String> {
    vec!["http://localhost:3000".to_string()]
}

fn default_tick_ms() -> u64 {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ip: default_ip(),
            port: default_port(),
            allowed_origins: default_allowed_origins(),
            tick_ms: default_tick_ms(),
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// `ip:port` string suitable for binding.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Broadcast period, never shorter than one millisecond.
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Exact-match origin check against the allow-list.
    pub fn is_origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.iter().any(|o| o == origin)
    }
}
