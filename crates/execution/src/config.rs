//! Engine configuration

use crate::error::ConfigError;
use crate::gas::GasPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of execution rounds per block.
pub const DEFAULT_EXE_ROUND_COUNT: usize = 10;

/// Default number of standby entries taken per round.
pub const DEFAULT_RUNNER_COUNT: usize = 100;

/// Default number of worker threads of the block pool.
pub const DEFAULT_PARALLEL_NUM: usize = 32;

/// Default initial capacity of the collected transaction list.
pub const DEFAULT_TX_LIST_CAP: usize = 100;

/// Default number of ad-hoc runner slots.
pub const DEFAULT_ADHOC_RUNNER_COUNT: usize = 256;

/// Transaction engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum execution rounds per block. Entries still queued after the
    /// last round roll over to the next block.
    pub exe_round_count: usize,

    /// Maximum standby entries executed in one round
    pub runner_count: usize,

    /// Worker threads of the block pool
    pub parallel_num: usize,

    /// Initial capacity of the collected transaction list
    pub default_tx_list_cap: usize,

    /// Slots of the ad-hoc pool
    pub adhoc_runner_count: usize,

    /// Gas settlement policy
    pub gas_policy: GasPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            exe_round_count: DEFAULT_EXE_ROUND_COUNT,
            runner_count: DEFAULT_RUNNER_COUNT,
            parallel_num: DEFAULT_PARALLEL_NUM,
            default_tx_list_cap: DEFAULT_TX_LIST_CAP,
            adhoc_runner_count: DEFAULT_ADHOC_RUNNER_COUNT,
            gas_policy: GasPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Config with the given pool shape and defaults elsewhere.
    pub fn new(
        exe_round_count: usize,
        runner_count: usize,
        parallel_num: usize,
        default_tx_list_cap: usize,
    ) -> Self {
        Self {
            exe_round_count,
            runner_count,
            parallel_num,
            default_tx_list_cap,
            ..Self::default()
        }
    }

    /// Check that the engine can run with this config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.exe_round_count == 0 {
            return Err(ConfigError::invalid("exe_round_count", "must be at least 1"));
        }
        if self.runner_count == 0 {
            return Err(ConfigError::invalid("runner_count", "must be at least 1"));
        }
        if self.parallel_num == 0 {
            return Err(ConfigError::invalid("parallel_num", "must be at least 1"));
        }
        if self.adhoc_runner_count == 0 {
            return Err(ConfigError::invalid(
                "adhoc_runner_count",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Save config to a JSON file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load and validate config from a JSON file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.exe_round_count, 10);
        assert_eq!(cfg.runner_count, 100);
        assert_eq!(cfg.parallel_num, 32);
        assert_eq!(cfg.default_tx_list_cap, 100);
        assert_eq!(cfg.adhoc_runner_count, 256);
        assert!(!cfg.gas_policy.smoothing);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero() {
        let cfg = EngineConfig::new(5, 0, 2, 10);
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("runner_count"));

        let cfg = EngineConfig {
            adhoc_runner_count: 0,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"runner_count": 4, "gas_policy": {"smoothing": true}}"#)
                .unwrap();
        assert_eq!(cfg.runner_count, 4);
        assert_eq!(cfg.exe_round_count, DEFAULT_EXE_ROUND_COUNT);
        assert!(cfg.gas_policy.smoothing);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let cfg = EngineConfig::new(3, 7, 2, 50);
        cfg.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), cfg);
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            EngineConfig::load(&missing),
            Err(ConfigError::Io { .. })
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, "{ not json").unwrap();
        assert!(matches!(EngineConfig::load(&bad), Err(ConfigError::Parse(_))));

        let invalid = dir.path().join("invalid.json");
        std::fs::write(&invalid, r#"{"parallel_num": 0}"#).unwrap();
        assert!(matches!(
            EngineConfig::load(&invalid),
            Err(ConfigError::InvalidValue { field: "parallel_num", .. })
        ));
    }
}
