use common::{AssetClass, PositionEntry, StalenessScore};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitParams {
    #[serde(default = "default_equity_take_profit_pct")]
    pub equity_take_profit_pct: f64,
    #[serde(default = "default_equity_stop_loss_pct")]
    pub equity_stop_loss_pct: f64,
    #[serde(default = "default_crypto_take_profit_pct")]
    pub crypto_take_profit_pct: f64,
    #[serde(default = "default_crypto_stop_loss_pct")]
    pub crypto_stop_loss_pct: f64,
    #[serde(default = "default_options_take_profit_pct")]
    pub options_take_profit_pct: f64,
    #[serde(default = "default_options_stop_loss_pct")]
    pub options_stop_loss_pct: f64,
    /// Drawdown from peak (percent) that exits a winning position. 0 disables.
    #[serde(default)]
    pub trailing_stop_pct: f64,
}

fn default_equity_take_profit_pct() -> f64 {
    10.0
}
fn default_equity_stop_loss_pct() -> f64 {
    5.0
}
fn default_crypto_take_profit_pct() -> f64 {
    8.0
}
fn default_crypto_stop_loss_pct() -> f64 {
    6.0
}
fn default_options_take_profit_pct() -> f64 {
    50.0
}
fn default_options_stop_loss_pct() -> f64 {
    40.0
}

impl Default for ExitParams {
    fn default() -> Self {
        Self {
            equity_take_profit_pct: default_equity_take_profit_pct(),
            equity_stop_loss_pct: default_equity_stop_loss_pct(),
            crypto_take_profit_pct: default_crypto_take_profit_pct(),
            crypto_stop_loss_pct: default_crypto_stop_loss_pct(),
            options_take_profit_pct: default_options_take_profit_pct(),
            options_stop_loss_pct: default_options_stop_loss_pct(),
            trailing_stop_pct: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    Stale,
    BreakingNews,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExitSignal {
    pub symbol: String,
    pub reason: ExitReason,
    pub pnl_pct: Option<f64>,
    pub detail: String,
}

impl ExitParams {
    /// `(take_profit, stop_loss)` in positive percent.
    pub fn thresholds(&self, class: AssetClass) -> (f64, f64) {
        match class {
            AssetClass::Equity => (self.equity_take_profit_pct, self.equity_stop_loss_pct),
            AssetClass::Crypto => (self.crypto_take_profit_pct, self.crypto_stop_loss_pct),
            AssetClass::Option => (self.options_take_profit_pct, self.options_stop_loss_pct),
        }
    }

    /// Decide whether a held position should exit now. P&L rules are
    /// skipped while the entry price is pending; staleness never applies
    /// to options.
    pub fn evaluate(
        &self,
        entry: &PositionEntry,
        current_price: f64,
        staleness: Option<&StalenessScore>,
    ) -> Option<ExitSignal> {
        let pnl_pct = entry
            .entry_price
            .filter(|p| *p > 0.0)
            .map(|basis| (current_price - basis) / basis * 100.0);
        let signal = |reason: ExitReason, detail: String| ExitSignal {
            symbol: entry.symbol.clone(),
            reason,
            pnl_pct,
            detail,
        };

        if let Some(pnl) = pnl_pct {
            let (take_profit, stop_loss) = self.thresholds(entry.asset_class);
            if pnl >= take_profit {
                return Some(signal(
                    ExitReason::TakeProfit,
                    format!("pnl {:.2}% >= take profit {:.2}%", pnl, take_profit),
                ));
            }
            if pnl <= -stop_loss {
                return Some(signal(
                    ExitReason::StopLoss,
                    format!("pnl {:.2}% <= stop loss -{:.2}%", pnl, stop_loss),
                ));
            }
            if self.trailing_stop_pct > 0.0 && pnl > 0.0 && entry.peak_price > 0.0 {
                let drawdown = (entry.peak_price - current_price) / entry.peak_price * 100.0;
                if drawdown >= self.trailing_stop_pct {
                    return Some(signal(
                        ExitReason::TrailingStop,
                        format!(
                            "{:.2}% off peak {:.4} (trail {:.2}%)",
                            drawdown, entry.peak_price, self.trailing_stop_pct
                        ),
                    ));
                }
            }
        }

        if entry.asset_class != AssetClass::Option {
            if let Some(score) = staleness.filter(|s| s.is_stale) {
                return Some(signal(
                    ExitReason::Stale,
                    format!("staleness {:.0}: {}", score.score, score.reason),
                ));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(class: AssetClass, price: Option<f64>, peak: f64) -> PositionEntry {
        PositionEntry {
            symbol: "TEST".into(),
            asset_class: class,
            entry_time: Utc::now(),
            entry_price: price,
            entry_sentiment: 0.5,
            entry_social_volume: 10,
            entry_sources: vec!["reddit".into()],
            entry_reason: "test".into(),
            peak_price: peak,
            peak_sentiment: 0.5,
        }
    }

    fn stale() -> StalenessScore {
        StalenessScore {
            score: 85.0,
            is_stale: true,
            reason: "test".into(),
        }
    }

    #[test]
    fn test_take_profit_and_stop_loss_per_class() {
        let params = ExitParams::default();
        let equity = entry(AssetClass::Equity, Some(100.0), 100.0);
        assert_eq!(
            params.evaluate(&equity, 111.0, None).map(|s| s.reason),
            Some(ExitReason::TakeProfit)
        );
        assert_eq!(
            params.evaluate(&equity, 94.0, None).map(|s| s.reason),
            Some(ExitReason::StopLoss)
        );
        assert!(params.evaluate(&equity, 103.0, None).is_none());

        // -20% would stop an equity out but is within options tolerance.
        let option = entry(AssetClass::Option, Some(2.0), 2.0);
        assert!(params.evaluate(&option, 1.6, None).is_none());
        assert_eq!(
            params.evaluate(&option, 3.2, None).map(|s| s.reason),
            Some(ExitReason::TakeProfit)
        );
    }

    #[test]
    fn test_pending_entry_price_suppresses_pnl_exits() {
        let params = ExitParams::default();
        let pending = entry(AssetClass::Equity, None, 0.0);
        assert!(params.evaluate(&pending, 1.0, None).is_none());
        assert_eq!(
            params.evaluate(&pending, 1.0, Some(&stale())).map(|s| s.reason),
            Some(ExitReason::Stale)
        );
    }

    #[test]
    fn test_trailing_stop_only_in_profit() {
        let params = ExitParams {
            trailing_stop_pct: 3.0,
            ..ExitParams::default()
        };
        let winner = entry(AssetClass::Crypto, Some(100.0), 107.0);
        assert_eq!(
            params.evaluate(&winner, 103.5, None).map(|s| s.reason),
            Some(ExitReason::TrailingStop)
        );

        let loser = entry(AssetClass::Crypto, Some(100.0), 107.0);
        assert!(params.evaluate(&loser, 99.0, None).is_none());
    }

    #[test]
    fn test_options_skip_staleness() {
        let params = ExitParams::default();
        let option = entry(AssetClass::Option, Some(2.0), 2.0);
        assert!(params.evaluate(&option, 2.1, Some(&stale())).is_none());
    }
}
