use common::AssetClass;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizingParams {
    /// Fraction of cash committed at full confidence.
    #[serde(default = "default_size_pct")]
    pub size_pct: f64,
    #[serde(default = "default_max_equity_position")]
    pub max_equity_position: f64,
    #[serde(default = "default_max_crypto_position")]
    pub max_crypto_position: f64,
    #[serde(default = "default_max_options_position")]
    pub max_options_position: f64,
    #[serde(default = "default_min_notional")]
    pub min_notional: f64,
}

fn default_size_pct() -> f64 {
    0.1
}
fn default_max_equity_position() -> f64 {
    5000.0
}
fn default_max_crypto_position() -> f64 {
    2000.0
}
fn default_max_options_position() -> f64 {
    1000.0
}
fn default_min_notional() -> f64 {
    25.0
}

impl Default for SizingParams {
    fn default() -> Self {
        Self {
            size_pct: default_size_pct(),
            max_equity_position: default_max_equity_position(),
            max_crypto_position: default_max_crypto_position(),
            max_options_position: default_max_options_position(),
            min_notional: default_min_notional(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SizeDecision {
    Order(f64),
    /// Below the notional floor; not worth the friction.
    TooSmall(f64),
}

impl SizingParams {
    pub fn max_for(&self, class: AssetClass) -> f64 {
        match class {
            AssetClass::Equity => self.max_equity_position,
            AssetClass::Crypto => self.max_crypto_position,
            AssetClass::Option => self.max_options_position,
        }
    }

    pub fn size(&self, cash: f64, confidence: f64, class: AssetClass) -> SizeDecision {
        let raw = cash.max(0.0) * self.size_pct * confidence.clamp(0.0, 1.0);
        let notional = (raw.min(self.max_for(class)) * 100.0).round() / 100.0;
        if notional < self.min_notional {
            SizeDecision::TooSmall(notional)
        } else {
            SizeDecision::Order(notional)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scales_with_confidence_and_caps() {
        let params = SizingParams::default();
        assert_eq!(
            params.size(10_000.0, 0.8, AssetClass::Equity),
            SizeDecision::Order(800.0)
        );
        assert_eq!(
            params.size(1_000_000.0, 1.0, AssetClass::Crypto),
            SizeDecision::Order(2000.0)
        );
    }

    #[test]
    fn test_floor_skips_tiny_orders() {
        let params = SizingParams::default();
        assert_eq!(
            params.size(200.0, 0.6, AssetClass::Equity),
            SizeDecision::TooSmall(12.0)
        );
        assert_eq!(
            params.size(-50.0, 0.9, AssetClass::Equity),
            SizeDecision::TooSmall(0.0)
        );
    }
}
