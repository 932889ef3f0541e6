//! Layered settings: defaults, optional TOML file, then environment

use alerting::AlertConfig;
use config::{Config, ConfigError, Environment, File};
use dms::DmsConfig;
use monitor::MonitorConfig;
use notify::NotifierConfig;
use serde::{Deserialize, Serialize};
use storage::StorageConfig;

use crate::rate_limit::RateLimitConfig;

/// Environment variable naming the settings file
pub const CONFIG_PATH_ENV: &str = "DRIVER_WATCH_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/driver-watch.toml";
const ENV_PREFIX: &str = "DRIVER_WATCH";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind_addr: String,
    /// Limit on the test-notification endpoint, per peer IP
    pub notify_test_rate_limit: RateLimitConfig,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            notify_test_rate_limit: RateLimitConfig::strict(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter used when RUST_LOG is unset
    pub level: String,
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub dms: DmsConfig,
    pub alerting: AlertConfig,
    pub notifier: NotifierConfig,
    pub storage: StorageConfig,
}

impl Settings {
    /// Load from the file named by `DRIVER_WATCH_CONFIG` (or the default path)
    pub fn load() -> Result<Self, ConfigError> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    /// Defaults, then `path` if it exists, then `DRIVER_WATCH__SECTION__KEY` variables
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(Config::try_from(&Settings::default())?)
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            dms: self.dms.clone(),
            alerting: self.alerting.clone(),
            storage: self.storage.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting::ResetPolicy;
    use notify::NotifierKind;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let settings = Settings::load_from("does/not/exist.toml").unwrap();
        assert_eq!(settings.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(settings.alerting.response_timeout_secs, 10.0);
        assert_eq!(settings.dms.eyes_closed_alarm_secs, 5.0);
        assert_eq!(settings.notifier.kind, NotifierKind::Disabled);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = std::env::temp_dir().join(format!("driver-watch-{}.toml", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[alerting]
cooldown_secs = 60.0
reset_policy = "any_non_critical"

[notifier]
kind = "log"

[dms]
warning_secs = 1.5
"#
        )
        .unwrap();

        let settings = Settings::load_from(path.to_str().unwrap()).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(settings.alerting.cooldown_secs, 60.0);
        assert_eq!(settings.alerting.reset_policy, ResetPolicy::AnyNonCritical);
        assert_eq!(settings.alerting.response_timeout_secs, 10.0);
        assert_eq!(settings.notifier.kind, NotifierKind::Log);
        assert_eq!(settings.dms.warning_secs, 1.5);
        assert!(settings.monitor_config().validate().is_ok());
    }
}
