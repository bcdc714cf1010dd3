//! Runtime configuration: conversion rates, limits and announcement
//! destinations. Every field has a default, so an empty file is valid.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::Amount;
use crate::notify::ChannelRole;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid rates: {0}")]
    Rates(&'static str),

    #[error("invalid limits: {0}")]
    Limits(&'static str),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rates: Rates,
    pub limits: Limits,
    pub channels: Channels,
}

impl Config {
    /// Parse and validate a TOML document.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Rates must be usable and the smallest accepted top-up must buy at
    /// least one coin, otherwise it could never be approved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.rates.validate()?;
        if self
            .rates
            .quote_top_up(self.limits.min_topup_vnd, false)
            .total
            .is_zero()
        {
            return Err(ConfigError::Limits("minimum top-up buys no coins"));
        }
        Ok(())
    }
}

/// Conversion between VND and Bee Coin.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Rates {
    /// VND per conversion unit.
    pub vnd_per_unit: u64,
    /// Bee Coin per conversion unit.
    pub coins_per_unit: u64,
    pub first_topup_bonus_percent: u64,
    pub withdrawal_fee_percent: u64,
}

impl Default for Rates {
    fn default() -> Self {
        Self {
            vnd_per_unit: 10_000,
            coins_per_unit: 7,
            first_topup_bonus_percent: 5,
            withdrawal_fee_percent: 30,
        }
    }
}

/// Breakdown of the coins credited by an approved top-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopUpQuote {
    pub base: Amount,
    pub bonus: Amount,
    pub total: Amount,
}

impl Rates {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vnd_per_unit == 0 || self.coins_per_unit == 0 {
            return Err(ConfigError::Rates("conversion units must be positive"));
        }
        if self.withdrawal_fee_percent > 100 {
            return Err(ConfigError::Rates("withdrawal fee cannot exceed 100%"));
        }
        Ok(())
    }

    /// `base = floor(vnd * coins / unit)`, plus `ceil(base * bonus%)` on the
    /// first top-up.
    pub fn quote_top_up(&self, amount_vnd: u64, first_topup: bool) -> TopUpQuote {
        let base = u128::from(amount_vnd) * u128::from(self.coins_per_unit)
            / u128::from(self.vnd_per_unit);
        let bonus = if first_topup {
            (base * u128::from(self.first_topup_bonus_percent)).div_ceil(100)
        } else {
            0
        };
        let base = saturate(base);
        let bonus = saturate(bonus);
        TopUpQuote {
            base: Amount::new(base),
            bonus: Amount::new(bonus),
            total: Amount::new(base.saturating_add(bonus)),
        }
    }

    /// VND paid out for `coins` after the service fee, rounded down.
    pub fn withdrawal_payout(&self, coins: Amount) -> u64 {
        let kept = 100 - u128::from(self.withdrawal_fee_percent.min(100));
        let numerator = u128::from(coins.coins()) * u128::from(self.vnd_per_unit) * kept;
        let denominator = u128::from(self.coins_per_unit) * 100;
        saturate(numerator / denominator)
    }
}

fn saturate(value: u128) -> u64 {
    u64::try_from(value).unwrap_or(u64::MAX)
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub min_topup_vnd: u64,
    pub min_withdrawal_coins: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            min_topup_vnd: 10_000,
            min_withdrawal_coins: 10,
        }
    }
}

/// Destination identifiers on the host platform.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Channels {
    pub approvals: String,
    pub audit: String,
    pub registrations: String,
    pub showcase: String,
    pub approver_permission: String,
    /// Added to every private channel the engine asks for.
    pub admin_user: Option<String>,
}

impl Default for Channels {
    fn default() -> Self {
        Self {
            approvals: "approvals".to_string(),
            audit: "audit".to_string(),
            registrations: "registrations".to_string(),
            showcase: "showcase".to_string(),
            approver_permission: "ManageChannels".to_string(),
            admin_user: None,
        }
    }
}

impl Channels {
    pub fn destination(&self, role: ChannelRole) -> &str {
        match role {
            ChannelRole::Approvals => &self.approvals,
            ChannelRole::Audit => &self.audit,
            ChannelRole::Registrations => &self.registrations,
            ChannelRole::Showcase => &self.showcase,
        }
    }
}
