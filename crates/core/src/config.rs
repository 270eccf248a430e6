//! Session configuration.

use crate::catalog::PWM_MAX;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for a device session.
///
/// Every field has a default, so a config file only needs to name the
/// values it overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// HID interface to claim. The beacon family exposes a single interface.
    pub interface: u8,
    /// Control transfer timeout in milliseconds.
    pub timeout_ms: u64,
    /// PWM percentage applied to every LED during initialization.
    pub default_intensity: u8,
    /// Number of repeated "on" writes issued by a flash.
    pub flash_repeat: usize,
    /// Extra attempts for transient failures on non-destructive queries.
    pub query_retries: u32,
    /// Upper bound on outstanding timed turn-offs.
    pub max_pending_timers: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            interface: 0,
            timeout_ms: 1000,
            default_intensity: 50,
            flash_repeat: 500,
            query_retries: crate::comm::MAX_RETRIES,
            max_pending_timers: 4,
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Reject values the session cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.default_intensity > PWM_MAX {
            return Err(Error::InvalidArgument {
                field: "default_intensity",
                value: self.default_intensity as u32,
                min: 0,
                max: PWM_MAX as u32,
            });
        }
        if self.timeout_ms == 0 {
            return Err(Error::Config(
                "timeout_ms must be non-zero; unbounded transfers are not allowed".into(),
            ));
        }
        if self.max_pending_timers == 0 {
            return Err(Error::Config("max_pending_timers must be at least 1".into()));
        }
        Ok(())
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(format!("parse: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = SessionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_intensity, 50);
        assert_eq!(config.flash_repeat, 500);
        assert_eq!(config.timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SessionConfig::from_json_str(r#"{ "default_intensity": 100 }"#).unwrap();
        assert_eq!(config.default_intensity, 100);
        assert_eq!(config.timeout_ms, 1000);
        assert_eq!(config.interface, 0);
    }

    #[test]
    fn rejects_intensity_over_100() {
        let err = SessionConfig::from_json_str(r#"{ "default_intensity": 120 }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[test]
    fn rejects_zero_timeout() {
        assert!(SessionConfig::from_json_str(r#"{ "timeout_ms": 0 }"#).is_err());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            SessionConfig::from_json_str("{ nope"),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(file, r#"{{ "flash_repeat": 20, "timeout_ms": 250 }}"#).expect("write config");
        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.flash_repeat, 20);
        assert_eq!(config.timeout_ms, 250);
    }

    #[test]
    fn load_missing_file_fails() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(SessionConfig::load(&dir.path().join("absent.json")).is_err());
    }

    #[test]
    fn config_serialization_roundtrip() {
        let config = SessionConfig::default();
        let json = serde_json::to_string(&config).expect("serialize config");
        assert_eq!(SessionConfig::from_json_str(&json).unwrap(), config);
    }
}
