//! Escalation configuration

use dms::AlertLevel;
use serde::{Deserialize, Serialize};

use crate::AlertError;

/// Which observed activities count as the driver having responded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Only SAFE activities end an episode
    #[default]
    SafeOnly,
    /// Anything below CRITICAL ends an episode, including the warning band
    AnyNonCritical,
}

impl ResetPolicy {
    pub fn resets_on(&self, level: AlertLevel) -> bool {
        match self {
            Self::SafeOnly => level == AlertLevel::Safe,
            Self::AnyNonCritical => level < AlertLevel::Critical,
        }
    }
}

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Time the driver has to respond before the owner is notified (seconds)
    pub response_timeout_secs: f64,
    /// Minimum spacing between successful notifications (seconds)
    pub cooldown_secs: f64,
    /// Minimum spacing between attempts after a failed send (seconds)
    pub retry_interval_secs: f64,
    /// Upper bound on a single sink call (seconds)
    pub send_timeout_secs: f64,
    /// Notification records kept in memory
    pub history_limit: usize,
    /// Activities that end an episode
    pub reset_policy: ResetPolicy,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            response_timeout_secs: 10.0,
            cooldown_secs: 120.0,
            retry_interval_secs: 5.0,
            send_timeout_secs: 10.0,
            history_limit: 1000,
            reset_policy: ResetPolicy::SafeOnly,
        }
    }
}

impl AlertConfig {
    /// Reject non-positive timings
    pub fn validate(&self) -> Result<(), AlertError> {
        let positive = [
            ("response_timeout_secs", self.response_timeout_secs),
            ("send_timeout_secs", self.send_timeout_secs),
        ];
        for (name, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(AlertError::Config(format!("{} must be positive, got {}", name, value)));
            }
        }

        let non_negative = [
            ("cooldown_secs", self.cooldown_secs),
            ("retry_interval_secs", self.retry_interval_secs),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(AlertError::Config(format!(
                    "{} must not be negative, got {}",
                    name, value
                )));
            }
        }

        if self.history_limit == 0 {
            return Err(AlertError::Config("history_limit must be at least 1".to_string()));
        }

        Ok(())
    }
}
