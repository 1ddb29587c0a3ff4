use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{MapError, MapResult};

/// Configuration for a [`MappingContext`](crate::MappingContext).
///
/// ```toml
/// [lock]
/// lease_ms = 60000
/// poll_interval_ms = 500
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    pub lock: LockConfig,
}

/// Lease lock timing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    /// Lease lifetime; an unreleased lock clears itself after this long.
    pub lease_ms: u64,
    /// Sleep between acquisition attempts.
    pub poll_interval_ms: u64,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ms: 60_000,
            poll_interval_ms: 500,
        }
    }
}

impl LockConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl MapperConfig {
    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(raw: &str) -> MapResult<Self> {
        let config: Self = toml::from_str(raw).map_err(|e| MapError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> MapResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MapError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    fn validate(&self) -> MapResult<()> {
        if self.lock.lease_ms == 0 {
            return Err(MapError::Config("lock.lease_ms must be positive".into()));
        }
        if self.lock.poll_interval_ms == 0 {
            return Err(MapError::Config(
                "lock.poll_interval_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}
