//! Per-cycle asset eligibility filter applied after aggregation.

use std::collections::{HashMap, HashSet};

use common::{Asset, Error, Signal};
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct EligibilityFilter {
    allowed_exchanges: HashSet<String>,
    assets: HashMap<String, Asset>,
    crypto_universe: HashSet<String>,
}

impl EligibilityFilter {
    pub fn new(
        allowed_exchanges: impl IntoIterator<Item = String>,
        assets: impl IntoIterator<Item = Asset>,
        crypto_universe: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            allowed_exchanges: allowed_exchanges
                .into_iter()
                .map(|e| e.to_ascii_uppercase())
                .collect(),
            assets: assets
                .into_iter()
                .map(|a| (a.symbol.clone(), a))
                .collect(),
            crypto_universe: crypto_universe.into_iter().collect(),
        }
    }

    pub fn check(&self, signal: &Signal) -> Result<(), Error> {
        let ineligible = |reason: &str| Error::AssetIneligible {
            symbol: signal.symbol.clone(),
            reason: reason.to_string(),
        };

        if signal.is_crypto {
            if self.crypto_universe.contains(&signal.symbol) {
                return Ok(());
            }
            return Err(ineligible("not in crypto universe"));
        }

        let asset = self
            .assets
            .get(&signal.symbol)
            .ok_or_else(|| ineligible("unknown asset"))?;
        if !asset.tradable {
            return Err(ineligible("not tradable"));
        }
        if !self.allowed_exchanges.is_empty()
            && !self
                .allowed_exchanges
                .contains(&asset.exchange.to_ascii_uppercase())
        {
            return Err(ineligible("exchange not allowed"));
        }
        Ok(())
    }

    /// Keep eligible signals; ineligible ones are dropped silently for this cycle.
    pub fn apply(&self, signals: Vec<Signal>) -> Vec<Signal> {
        signals
            .into_iter()
            .filter(|signal| match self.check(signal) {
                Ok(()) => true,
                Err(e) => {
                    debug!("dropping signal: {}", e);
                    false
                }
            })
            .collect()
    }
}
