//! Qdrant client configuration.

use std::time::Duration;

use qdrant_client::Qdrant;
use recordstore_core::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_CLIENT;

/// Configuration for Qdrant client connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QdrantConfig {
    /// Qdrant server URL (e.g., "http://localhost:6334")
    pub url: String,

    /// API key for authentication (optional)
    pub api_key: Option<String>,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Request timeout
    pub timeout: Duration,

    /// Keep idle connections alive with pings
    pub keep_alive: bool,
}

impl QdrantConfig {
    /// Create a new Qdrant configuration with the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        validate_url(&url)?;

        Ok(Self {
            url,
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            keep_alive: true,
        })
    }

    /// Set the API key for authentication.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable keep-alive.
    pub fn keep_alive(mut self, enable: bool) -> Self {
        self.keep_alive = enable;
        self
    }

    /// Check if TLS is used.
    pub fn is_tls_enabled(&self) -> bool {
        self.url.starts_with("https://")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validate_url(&self.url)?;

        if self.connect_timeout.is_zero() {
            return Err(Error::configuration(
                "Connect timeout must be greater than zero",
            ));
        }

        if self.timeout.is_zero() {
            return Err(Error::configuration(
                "Request timeout must be greater than zero",
            ));
        }

        Ok(())
    }

    /// Builds a client from the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the client cannot be built.
    pub fn connect(&self) -> Result<Qdrant> {
        self.validate()?;

        let mut builder = Qdrant::from_url(&self.url)
            .api_key(self.api_key.clone())
            .timeout(self.timeout)
            .connect_timeout(self.connect_timeout);

        if self.keep_alive {
            builder = builder.keep_alive_while_idle();
        }

        let client = builder.build().map_err(|e| {
            tracing::error!(
                target: TRACING_TARGET_CLIENT,
                error = %e,
                url = %self.url,
                "Failed to create Qdrant client"
            );
            Error::configuration(format!("cannot create Qdrant client: {e}"))
        })?;

        tracing::info!(
            target: TRACING_TARGET_CLIENT,
            url = %self.url,
            "Qdrant client created"
        );

        Ok(client)
    }
}

fn validate_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(Error::configuration("URL cannot be empty"));
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::configuration(
            "URL must start with http:// or https://",
        ));
    }

    Ok(())
}

impl Default for QdrantConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6334".to_owned(),
            api_key: None,
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
            keep_alive: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = QdrantConfig::new("http://localhost:6334").unwrap();
        assert_eq!(config.url, "http://localhost:6334");
        assert!(config.api_key.is_none());
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_invalid_url() {
        assert!(QdrantConfig::new("").is_err());
        assert!(QdrantConfig::new("not-a-url").is_err());
        assert!(QdrantConfig::new("ftp://localhost").is_err());
    }

    #[test]
    fn test_config_fluent_api() {
        let config = QdrantConfig::new("https://example.com:6334")
            .unwrap()
            .api_key("secret-key")
            .timeout(Duration::from_secs(60));

        assert_eq!(config.api_key.as_deref(), Some("secret-key"));
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert!(config.is_tls_enabled());
    }

    #[test]
    fn test_config_validation() {
        assert!(QdrantConfig::default().validate().is_ok());

        let invalid = QdrantConfig {
            connect_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(invalid.validate().is_err());
    }
}
