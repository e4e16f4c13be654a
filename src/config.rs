use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::DEFAULT_PORT;
use crate::service::AirTouchServiceBuilder;
use crate::{Error, Result};

pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 60;

/// Connection settings for one controller, as stored by the host
/// application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AirTouchConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Seconds between status refreshes.
    #[serde(default = "default_refresh_interval", alias = "refreshInterval")]
    pub refresh_interval: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_refresh_interval() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

impl AirTouchConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL_SECS,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("port must not be 0".into()));
        }
        if self.refresh_interval == 0 {
            return Err(Error::InvalidConfig("refresh interval must be at least 1 second".into()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval)
    }

    pub fn service_builder(&self) -> Result<AirTouchServiceBuilder> {
        self.validate()?;
        Ok(AirTouchServiceBuilder::new(self.host.trim()).port(self.port))
    }
}
