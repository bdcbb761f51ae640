//! Network listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

/// WebSocket listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:8080").
    pub address: SocketAddr,
    /// Allowed origins for CORS (e.g., `["https://example.com"]`).
    /// Empty list allows all origins.
    #[serde(default)]
    pub allow_origins: Vec<String>,
    /// `Location` sent with the 302 returned for upgrades that do not name
    /// a valid document.
    #[serde(default = "default_redirect_location")]
    pub redirect_location: String,
}

fn default_redirect_location() -> String {
    "/".to_string()
}

impl ListenConfig {
    /// Whether a request carrying `origin` may upgrade.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allow_origins.is_empty() {
            return true;
        }
        match origin {
            Some(origin) => self.allow_origins.iter().any(|a| a == origin || a == "*"),
            None => false,
        }
    }
}
