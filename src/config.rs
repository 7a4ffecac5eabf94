//! Engine configuration parameters
//!
//! All tunable parameters for the domain-services engine.
//! Values can be loaded from a JSON document or a persisted postcard blob.

use core::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ds::protocol::{CPU_RECORD_SIZE, CPU_TAG_SIZE, DEFAULT_MTU, HANDLE_SIZE, HEADER_SIZE, VAR_MSG_MAX, Version};
use crate::ds::transport::RetryPolicy;
use crate::error::ConfigError;

/// Core engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // --- Versions ---
    /// Protocol version offered in INIT_REQ
    pub protocol: Version,
    /// Version offered for every service in REG_REQ
    pub service: Version,

    // --- CPU reconfiguration ---
    /// Register `dr-cpu` and run the reconfiguration worker
    pub cpu_hotplug: bool,
    /// CPU ids at or above this are dropped from requests
    pub max_cpus: u32,

    // --- Channel ---
    /// Largest message the receive path accepts (tag included)
    pub mtu: usize,
    /// Attempts before a busy channel becomes a send failure
    pub send_retry_limit: u32,
    /// Delay between busy retries (microseconds)
    pub send_retry_delay_us: u64,

    // --- Variable config ---
    /// Wait ceiling for a variable-config response (milliseconds)
    pub var_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            // Versions
            protocol: Version::new(1, 0),
            service: Version::new(1, 0),

            // CPU reconfiguration
            cpu_hotplug: true,
            max_cpus: 64,

            // Channel
            mtu: DEFAULT_MTU,
            send_retry_limit: 1000,
            send_retry_delay_us: 1,

            // Variable config
            var_timeout_ms: 100, // 1000 polls x 100us
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON document. Missing fields take defaults.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text).map_err(|_| ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Encode as a compact postcard blob for persistence.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Encoding)
    }

    /// Decode and validate a postcard blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Encoding)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_cpus == 0 {
            return Err(ConfigError::ValidationFailed("max_cpus must be non-zero"));
        }
        if self.send_retry_limit == 0 {
            return Err(ConfigError::ValidationFailed("send_retry_limit must be non-zero"));
        }
        if self.var_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("var_timeout_ms must be non-zero"));
        }
        // Room for a variable-config request and a one-record CPU request.
        let floor = (HEADER_SIZE + HANDLE_SIZE + CPU_TAG_SIZE + CPU_RECORD_SIZE).max(VAR_MSG_MAX);
        if self.mtu < floor {
            return Err(ConfigError::ValidationFailed("mtu below smallest usable message size"));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.send_retry_limit,
            delay: Duration::from_micros(self.send_retry_delay_us),
        }
    }

    pub fn var_timeout(&self) -> Duration {
        Duration::from_millis(self.var_timeout_ms)
    }
}
