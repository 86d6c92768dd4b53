use crate::queue::{DEFAULT_PRECISION, MAX_PRECISION};
use serde::{Deserialize, Serialize};

/// A setting a context cannot run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("time precision {0} exceeds the maximum of {MAX_PRECISION} decimals")]
    TimePrecision(u32),
}

/// Construction-time settings of a simulation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Seed of the context's random generator.
    pub seed: u64,
    /// Decimals event fire times are rounded to.
    pub time_precision: u32,
    /// Keep a log of every executed event.
    pub log_events: bool,
}

impl SimConfig {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_precision > MAX_PRECISION {
            return Err(ConfigError::TimePrecision(self.time_precision));
        }
        Ok(())
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            time_precision: DEFAULT_PRECISION,
            log_events: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let cfg: SimConfig = serde_json::from_str(r#"{"seed": 7}"#).unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.time_precision, 4);
        assert!(!cfg.log_events);
    }

    #[test]
    fn precision_is_bounded() {
        let at = |time_precision| SimConfig {
            time_precision,
            ..SimConfig::default()
        };
        assert!(at(MAX_PRECISION).validate().is_ok());
        assert_eq!(at(400).validate(), Err(ConfigError::TimePrecision(400)));
    }

    #[test]
    fn with_seed_keeps_other_defaults() {
        let cfg = SimConfig::with_seed(9);
        assert_eq!(cfg, SimConfig { seed: 9, ..SimConfig::default() });
    }
}
