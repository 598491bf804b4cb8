use std::collections::VecDeque;
use std::time::{Duration, Instant};

use common::{Account, BrokerPosition, Error, Result};

use crate::config::RiskConfig;

/// Pre-trade checks on every BUY. Violations come back as `OrderRejected`.
pub struct RiskGuard {
    config: RiskConfig,
    order_timestamps: VecDeque<Instant>,
}

impl RiskGuard {
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            order_timestamps: VecDeque::new(),
        }
    }

    fn prune_orders(&mut self) {
        let cutoff = Instant::now() - Duration::from_secs(60);
        while self.order_timestamps.front().is_some_and(|ts| *ts < cutoff) {
            self.order_timestamps.pop_front();
        }
    }

    pub fn record_order(&mut self) {
        self.prune_orders();
        self.order_timestamps.push_back(Instant::now());
    }

    pub fn check_buy(
        &mut self,
        symbol: &str,
        notional: f64,
        positions: &[BrokerPosition],
        account: &Account,
    ) -> Result<()> {
        let reject = |reason: String| Error::OrderRejected {
            symbol: symbol.to_string(),
            reason,
        };

        if notional <= 0.0 {
            return Err(reject("notional must be positive".into()));
        }

        self.prune_orders();
        if self.order_timestamps.len() as u32 >= self.config.max_orders_per_minute {
            return Err(reject(format!(
                "order throttle exceeded: {} >= {}",
                self.order_timestamps.len(),
                self.config.max_orders_per_minute
            )));
        }

        let already_held = positions.iter().any(|p| p.symbol == symbol);
        if !already_held && positions.len() >= self.config.max_positions {
            return Err(reject(format!(
                "max positions reached: {} >= {}",
                positions.len(),
                self.config.max_positions
            )));
        }

        let total_exposure: f64 = positions.iter().map(|p| p.market_value.abs()).sum();
        if total_exposure + notional > self.config.max_total_exposure {
            return Err(reject(format!(
                "total exposure exceeded: {:.2} + {:.2} > {:.2}",
                total_exposure, notional, self.config.max_total_exposure
            )));
        }

        if account.cash - notional < self.config.min_cash_reserve {
            return Err(reject(format!(
                "cash reserve breached: {:.2} - {:.2} < {:.2}",
                account.cash, notional, self.config.min_cash_reserve
            )));
        }

        Ok(())
    }
}
