//! Configuration types.

use std::path::PathBuf;

use crate::engine::ENGINE_VERSION;
use crate::error::ConfigError;

/// Environment variable overriding [`GateConfig::default_delay_minutes`].
pub const DELAY_MINUTES_ENV: &str = "FOLLOWUP_DELAY_MINUTES";
/// Environment variable naming a JSON-lines audit log file.
pub const AUDIT_LOG_ENV: &str = "FOLLOWUP_AUDIT_LOG";

/// Follow-up gate configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Delay used when a lead has no per-lead override. May be negative;
    /// the engine treats that as zero.
    pub default_delay_minutes: i64,
    /// Where to append audit records, if anywhere.
    pub audit_log_path: Option<PathBuf>,
    /// Build identifier stamped on every audit record.
    pub engine_version: String,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            default_delay_minutes: 60 * 24, // 1 day
            audit_log_path: None,
            engine_version: ENGINE_VERSION.to_string(),
        }
    }
}

impl GateConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(DELAY_MINUTES_ENV) {
            config.default_delay_minutes = raw.trim().parse::<i64>().map_err(|e| {
                ConfigError::InvalidValue {
                    key: DELAY_MINUTES_ENV.to_string(),
                    message: format!("{raw:?} is not an integer number of minutes: {e}"),
                }
            })?;
        }

        if let Some(path) = lookup(AUDIT_LOG_ENV).filter(|p| !p.trim().is_empty()) {
            config.audit_log_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}
