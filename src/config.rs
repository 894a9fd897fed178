// 7.0 config.rs: protocol-wide settings in one place. fee ceiling, page cap, price decimals.
// 7.1 market defaults are what the simulator and tests initialize markets with.

use serde::{Deserialize, Serialize};

use crate::market::MarketParams;
use crate::types::{Wad, WAD, WAD_DECIMALS};

/// Hard cap on every fee rate. A configured ceiling can only tighten it.
pub const MAX_FEE_RATE: Wad = Wad::from_raw(5 * WAD);

/** 7.2: settings every market shares */
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    // Upper bound for every fee kind, at most MAX_FEE_RATE
    pub fee_ceiling: Wad,
    // Largest window a paginated read may ask for
    pub max_page_size: usize,
    // Decimals applied when decoding pool sqrt prices
    pub price_decimals: u8,
    // Defaults for new markets
    pub market_defaults: MarketParams,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            fee_ceiling: MAX_FEE_RATE,
            max_page_size: 10,
            price_decimals: 18,
            market_defaults: MarketParams::default(),
        }
    }
}

impl ProtocolConfig {
    pub fn testnet() -> Self {
        let mut config = Self::default();
        // cheaper CT to make DS trade further from par
        config.market_defaults.initial_ct_price = Wad::from_raw(WAD / 20);
        config
    }

    pub fn mainnet_conservative() -> Self {
        let mut config = Self::default();
        config.market_defaults.initial_ct_price = Wad::from_raw(WAD / 50);
        // 0.1% on redeem-with-DS
        config.market_defaults.base_redemption_fee_rate = Wad::from_raw(WAD / 10);
        config
    }

    // Validate the configuration for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fee_ceiling > MAX_FEE_RATE {
            return Err(ConfigError::InvalidFees {
                reason: "Fee ceiling above 5%".to_string(),
            });
        }

        if self.max_page_size == 0 {
            return Err(ConfigError::InvalidPaging {
                reason: "Page size must be positive".to_string(),
            });
        }

        if u32::from(self.price_decimals) > WAD_DECIMALS {
            return Err(ConfigError::InvalidPricing {
                reason: "Price decimals above 18".to_string(),
            });
        }

        if self.market_defaults.initial_ct_price.is_zero() {
            return Err(ConfigError::InvalidPricing {
                reason: "Initial CT price must be positive".to_string(),
            });
        }

        if self.market_defaults.base_redemption_fee_rate > self.fee_ceiling {
            return Err(ConfigError::InvalidFees {
                reason: "Base redemption fee above ceiling".to_string(),
            });
        }

        Ok(())
    }
}

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid fees: {reason}")]
    InvalidFees { reason: String },

    #[error("invalid paging: {reason}")]
    InvalidPaging { reason: String },

    #[error("invalid pricing: {reason}")]
    InvalidPricing { reason: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> ProtocolConfig {
        match self {
            Environment::Development => ProtocolConfig::default(),
            Environment::Testnet => ProtocolConfig::testnet(),
            Environment::Mainnet => ProtocolConfig::mainnet_conservative(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = ProtocolConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.fee_ceiling, Wad::from_int(5));
        assert_eq!(config.max_page_size, 10);
    }

    #[test]
    fn test_environment_presets() {
        assert!(Environment::Development.config().validate().is_ok());
        assert!(Environment::Testnet.config().validate().is_ok());
        assert!(Environment::Mainnet.config().validate().is_ok());
    }

    #[test]
    fn test_invalid_paging() {
        let mut config = ProtocolConfig::default();
        config.max_page_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPaging { .. })));
    }

    #[test]
    fn test_invalid_fees() {
        let mut config = ProtocolConfig::default();
        config.market_defaults.base_redemption_fee_rate = Wad::from_int(6);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFees { .. })));

        let mut config = ProtocolConfig::default();
        config.fee_ceiling = Wad::from_int(50);
        assert!(matches!(config.validate(), Err(ConfigError::InvalidFees { .. })));

        // a tighter ceiling is fine
        let mut config = ProtocolConfig::default();
        config.fee_ceiling = Wad::from_int(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_pricing() {
        let mut config = ProtocolConfig::default();
        config.price_decimals = 19;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPricing { .. })));
    }

    #[test]
    fn test_config_serialization() {
        let config = ProtocolConfig::mainnet_conservative();
        let json = serde_json::to_string(&config).unwrap();
        let back: ProtocolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
