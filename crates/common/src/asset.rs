//! Asset classification by symbol shape.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    Equity,
    Crypto,
    Option,
}

impl AssetClass {
    /// Classify a symbol. Crypto pairs carry a slash (`BTC/USD`); options use
    /// the OCC layout (`AAPL240119C00190000`); everything else is an equity.
    pub fn of_symbol(symbol: &str) -> Self {
        if OptionContract::parse(symbol).is_some() {
            AssetClass::Option
        } else if symbol.contains('/') {
            AssetClass::Crypto
        } else {
            AssetClass::Equity
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetClass::Equity => "equity",
            AssetClass::Crypto => "crypto",
            AssetClass::Option => "option",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OptionRight {
    Call,
    Put,
}

/// Decoded OCC option symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionContract {
    pub underlying: String,
    pub expiration: NaiveDate,
    pub right: OptionRight,
    pub strike: f64,
}

impl OptionContract {
    pub fn parse(symbol: &str) -> Option<Self> {
        // ROOT(1-6) + YYMMDD + C|P + 8-digit strike in thousandths.
        if symbol.len() < 16 || !symbol.is_ascii() {
            return None;
        }
        let tail = &symbol[symbol.len() - 15..];
        let root = &symbol[..symbol.len() - 15];
        if root.is_empty() || root.len() > 6 || !root.chars().all(|c| c.is_ascii_uppercase()) {
            return None;
        }

        let (date_part, rest) = tail.split_at(6);
        let (right_part, strike_part) = rest.split_at(1);
        if !date_part.chars().all(|c| c.is_ascii_digit())
            || !strike_part.chars().all(|c| c.is_ascii_digit())
        {
            return None;
        }

        let yy: i32 = date_part[0..2].parse().ok()?;
        let mm: u32 = date_part[2..4].parse().ok()?;
        let dd: u32 = date_part[4..6].parse().ok()?;
        let expiration = NaiveDate::from_ymd_opt(2000 + yy, mm, dd)?;
        let right = match right_part {
            "C" => OptionRight::Call,
            "P" => OptionRight::Put,
            _ => return None,
        };
        let strike = strike_part.parse::<u64>().ok()? as f64 / 1000.0;

        Some(Self {
            underlying: root.to_string(),
            expiration,
            right,
            strike,
        })
    }

    /// Days to expiration from `today` (negative once expired).
    pub fn dte(&self, today: NaiveDate) -> i64 {
        (self.expiration - today).num_days()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifies_symbols() {
        assert_eq!(AssetClass::of_symbol("AAPL"), AssetClass::Equity);
        assert_eq!(AssetClass::of_symbol("BTC/USD"), AssetClass::Crypto);
        assert_eq!(
            AssetClass::of_symbol("AAPL240119C00190000"),
            AssetClass::Option
        );
    }

    #[test]
    fn test_parses_occ_symbol() {
        let contract = OptionContract::parse("SPY250321P00450500").unwrap();
        assert_eq!(contract.underlying, "SPY");
        assert_eq!(contract.right, OptionRight::Put);
        assert!((contract.strike - 450.5).abs() < 1e-9);
        assert_eq!(
            contract.expiration,
            NaiveDate::from_ymd_opt(2025, 3, 21).unwrap()
        );
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        assert_eq!(contract.dte(today), 20);
    }

    #[test]
    fn test_rejects_malformed_option() {
        assert!(OptionContract::parse("AAPL24011XC00190000").is_none());
        assert!(OptionContract::parse("aapl240119C00190000").is_none());
        assert!(OptionContract::parse("AAPL241319C00190000").is_none());
    }
}
