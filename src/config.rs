//! Deployment configuration

use crate::error::ValidationError;
use anyhow::Context;
use serde::Deserialize;
use std::path::Path;

/// Who may cancel a contract that has not reached a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CancelPolicy {
    #[default]
    Either,
    Producer,
    Purchaser,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Days between a proposal and the delivery date written into the contract.
    pub delivery_window_days: i64,
    pub cancel_policy: CancelPolicy,
    /// Guarded-update attempts a reservation makes before reporting a conflict.
    pub reservation_attempts: u32,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            delivery_window_days: 30,
            cancel_policy: CancelPolicy::Either,
            reservation_attempts: 8,
        }
    }
}

impl MarketConfig {
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let config: MarketConfig = toml::from_str(text).context("failed to parse market config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.delivery_window_days < 0 {
            return Err(ValidationError::InvalidConfig(format!(
                "delivery_window_days is {}, expected zero or more",
                self.delivery_window_days
            )));
        }
        if self.reservation_attempts == 0 {
            return Err(ValidationError::InvalidConfig(
                "reservation_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
