//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("sync.outbound_queue must be at least 1")]
    ZeroOutboundQueue,
    #[error("sync.edit_queue must be at least 1")]
    ZeroEditQueue,
    #[error("listen.redirect_location is required")]
    MissingRedirectLocation,
    #[error("server.metrics_port {0} collides with the WebSocket listener")]
    MetricsPortCollision(u16),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }

    // tokio's bounded mpsc panics on a zero capacity.
    if config.sync.outbound_queue == 0 {
        errors.push(ValidationError::ZeroOutboundQueue);
    }
    if config.sync.edit_queue == 0 {
        errors.push(ValidationError::ZeroEditQueue);
    }

    if config.listen.redirect_location.is_empty() {
        errors.push(ValidationError::MissingRedirectLocation);
    }

    let metrics_port = config.server.metrics_port;
    if metrics_port != 0 && metrics_port == config.listen.address.port() {
        errors.push(ValidationError::MetricsPortCollision(metrics_port));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
