use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{InfernoError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlayerConfig {
    pub gateway: GatewayConfig,
    pub radio: RadioConfig,
    /// Artwork shown for audio tracks without an embedded cover.
    pub placeholder_cover: String,
    pub volume: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            radio: RadioConfig::default(),
            placeholder_cover: "alt.png".into(),
            volume: 1.0,
        }
    }
}

impl PlayerConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: PlayerConfig = serde_json::from_str(raw)
            .map_err(|err| InfernoError::Config(ConfigValidationError::Malformed(err.to_string())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.gateway.max_attempts == 0 {
            return Err(ConfigValidationError::ZeroAttempts);
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(ConfigValidationError::VolumeOutOfRange(self.volume));
        }
        if self.radio.poll_interval_secs == 0 {
            return Err(ConfigValidationError::ZeroPollInterval);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    pub max_attempts: u32,
    pub ready_delay_ms: u64,
    pub retry_backoff_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            ready_delay_ms: 100,
            retry_backoff_ms: 250,
        }
    }
}

impl GatewayConfig {
    pub fn ready_delay(&self) -> Duration {
        Duration::from_millis(self.ready_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RadioConfig {
    pub poll_interval_secs: u64,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
        }
    }
}

impl RadioConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigValidationError {
    #[error("malformed configuration: {0}")]
    Malformed(String),
    #[error("gateway must allow at least one attempt")]
    ZeroAttempts,
    #[error("volume {0} is outside 0.0..=1.0")]
    VolumeOutOfRange(f32),
    #[error("radio poll interval must be non-zero")]
    ZeroPollInterval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_bridge_contract() {
        let config = PlayerConfig::default();
        assert_eq!(config.gateway.max_attempts, 3);
        assert_eq!(config.gateway.ready_delay(), Duration::from_millis(100));
        assert_eq!(config.gateway.retry_backoff(), Duration::from_millis(250));
        assert_eq!(config.radio.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = PlayerConfig::from_json(r#"{"gateway": {"max_attempts": 5}, "volume": 0.4}"#)
            .expect("valid config");
        assert_eq!(config.gateway.max_attempts, 5);
        assert_eq!(config.gateway.retry_backoff_ms, 250);
        assert_eq!(config.placeholder_cover, "alt.png");
        assert!((config.volume - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn rejects_invalid_values() {
        let err = PlayerConfig::from_json(r#"{"gateway": {"max_attempts": 0}}"#).unwrap_err();
        assert!(matches!(
            err,
            InfernoError::Config(ConfigValidationError::ZeroAttempts)
        ));

        let config = PlayerConfig {
            volume: 1.5,
            ..PlayerConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigValidationError::VolumeOutOfRange(1.5))
        );

        let err = PlayerConfig::from_json("not json").unwrap_err();
        assert!(matches!(
            err,
            InfernoError::Config(ConfigValidationError::Malformed(_))
        ));
    }
}
