//! Engine configuration.
//!
//! Loaded from a JSON file where every field is optional, then adjusted by
//! environment overrides.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::rate_limit::RateLimits;
use crate::store::QuotaLimits;

const DEFAULT_WRITE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_QUEUE_ITEMS: usize = 100;
const DEFAULT_MAX_PARTY_MEMBERS: usize = 20;
const DEFAULT_POSITION_GAP_WARNING: f64 = 1e-6;

pub const ENV_WRITE_TIMEOUT_MS: &str = "PARTYQ_WRITE_TIMEOUT_MS";
pub const ENV_MAX_QUEUE_ITEMS: &str = "PARTYQ_MAX_QUEUE_ITEMS";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub rate_limits: RateLimits,
    /// Upper bound on any single store write
    pub write_timeout_ms: u64,
    pub max_queue_items: usize,
    pub max_party_members: usize,
    /// Warn when adjacent positions get closer than this
    pub position_gap_warning: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rate_limits: RateLimits::default(),
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            max_queue_items: DEFAULT_MAX_QUEUE_ITEMS,
            max_party_members: DEFAULT_MAX_PARTY_MEMBERS,
            position_gap_warning: DEFAULT_POSITION_GAP_WARNING,
        }
    }
}

impl EngineConfig {
    /// Read a config file; a missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        let config = serde_json::from_str::<Self>(&raw)?;
        tracing::debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let raw = serde_json::to_string_pretty(self)?;
        std::fs::write(path, raw)?;
        Ok(())
    }

    /// Apply `PARTYQ_*` overrides from the process environment.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(value) = lookup(ENV_WRITE_TIMEOUT_MS) {
            match value.trim().parse() {
                Ok(ms) => self.write_timeout_ms = ms,
                Err(_) => tracing::warn!("Ignoring invalid {ENV_WRITE_TIMEOUT_MS}={value}"),
            }
        }
        if let Some(value) = lookup(ENV_MAX_QUEUE_ITEMS) {
            match value.trim().parse() {
                Ok(max) => self.max_queue_items = max,
                Err(_) => tracing::warn!("Ignoring invalid {ENV_MAX_QUEUE_ITEMS}={value}"),
            }
        }
        self
    }

    pub const fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub const fn quota_limits(&self) -> QuotaLimits {
        QuotaLimits {
            max_queue_items: self.max_queue_items,
            max_party_members: self.max_party_members,
        }
    }
}
