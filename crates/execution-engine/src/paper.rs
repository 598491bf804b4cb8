//! In-memory brokerage for paper runs and tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc, Weekday};
use common::providers::{BrokerageProvider, MarketDataProvider};
use common::{
    Account, Asset, AssetClass, AssetFilter, BrokerPosition, Clock, Error, OrderAck,
    OrderRequest, OrderSide, Result,
};
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Default)]
struct PaperState {
    cash: f64,
    positions: BTreeMap<String, BrokerPosition>,
    marks: HashMap<String, f64>,
    assets: BTreeMap<String, Asset>,
    clock: Option<Clock>,
    rejected: HashSet<String>,
}

pub struct PaperBroker {
    state: Mutex<PaperState>,
    market: Option<Arc<dyn MarketDataProvider>>,
}

impl PaperBroker {
    pub fn new(cash: f64) -> Self {
        Self {
            state: Mutex::new(PaperState {
                cash,
                ..PaperState::default()
            }),
            market: None,
        }
    }

    /// Price fills and marks from a market-data provider instead of `set_price`.
    pub fn with_market(mut self, market: Arc<dyn MarketDataProvider>) -> Self {
        self.market = Some(market);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, PaperState>> {
        self.state
            .lock()
            .map_err(|_| Error::Other("paper broker state poisoned".into()))
    }

    pub fn set_price(&self, symbol: &str, price: f64) {
        if let Ok(mut state) = self.lock() {
            state.marks.insert(symbol.to_string(), price);
        }
    }

    pub fn set_clock(&self, clock: Clock) {
        if let Ok(mut state) = self.lock() {
            state.clock = Some(clock);
        }
    }

    pub fn add_asset(&self, asset: Asset) {
        if let Ok(mut state) = self.lock() {
            state.assets.insert(asset.symbol.clone(), asset);
        }
    }

    /// Make every order and close for `symbol` fail.
    pub fn reject_symbol(&self, symbol: &str) {
        if let Ok(mut state) = self.lock() {
            state.rejected.insert(symbol.to_string());
        }
    }

    async fn price_of(&self, symbol: &str) -> Option<f64> {
        if let Some(market) = &self.market {
            if let Ok(snapshot) = market.get_snapshot(symbol).await {
                if let Some(price) = snapshot.price() {
                    self.set_price(symbol, price);
                    return Some(price);
                }
            }
        }
        self.lock().ok()?.marks.get(symbol).copied()
    }

    fn ack(status: &str, price: Option<f64>) -> OrderAck {
        OrderAck {
            order_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            filled_avg_price: price,
        }
    }
}

/// Regular US equity session, 09:30-16:00 New York, approximated as
/// 13:30-20:00 UTC on weekdays.
pub fn regular_session_clock(now: DateTime<Utc>) -> Clock {
    let day_open = |d: DateTime<Utc>| {
        Utc.with_ymd_and_hms(d.year(), d.month(), d.day(), 13, 30, 0)
            .single()
            .unwrap_or(d)
    };
    let is_weekday = |d: DateTime<Utc>| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun);

    let today_open = day_open(now);
    let today_close = today_open + Duration::minutes(390);
    let is_open = is_weekday(now) && now >= today_open && now < today_close;

    let mut next_open = if now < today_open { today_open } else { today_open + Duration::days(1) };
    while !is_weekday(next_open) {
        next_open += Duration::days(1);
    }
    let next_close = if is_open { today_close } else { next_open + Duration::minutes(390) };

    Clock {
        timestamp: now,
        is_open,
        next_open,
        next_close,
    }
}

#[async_trait]
impl BrokerageProvider for PaperBroker {
    async fn get_account(&self) -> Result<Account> {
        let state = self.lock()?;
        let invested: f64 = state.positions.values().map(|p| p.market_value).sum();
        Ok(Account {
            cash: state.cash,
            equity: state.cash + invested,
            buying_power: state.cash,
        })
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>> {
        let symbols: Vec<String> = self.lock()?.positions.keys().cloned().collect();
        for symbol in &symbols {
            self.price_of(symbol).await;
        }
        let mut state = self.lock()?;
        let marks = state.marks.clone();
        Ok(state
            .positions
            .values_mut()
            .map(|p| {
                if let Some(mark) = marks.get(&p.symbol) {
                    p.current_price = *mark;
                    p.market_value = p.qty * mark;
                }
                p.clone()
            })
            .collect())
    }

    async fn get_clock(&self) -> Result<Clock> {
        let state = self.lock()?;
        Ok(state
            .clock
            .clone()
            .unwrap_or_else(|| regular_session_clock(Utc::now())))
    }

    async fn create_order(&self, order: &OrderRequest) -> Result<OrderAck> {
        let reject = |reason: &str| Error::OrderRejected {
            symbol: order.symbol.clone(),
            reason: reason.to_string(),
        };
        if self.lock()?.rejected.contains(&order.symbol) {
            return Err(reject("rejected by broker"));
        }
        let price = self
            .price_of(&order.symbol)
            .await
            .filter(|p| *p > 0.0)
            .ok_or_else(|| reject("no price"))?;

        let qty = match (order.notional, order.qty) {
            (Some(notional), _) => notional / price,
            (None, Some(qty)) => qty,
            (None, None) => return Err(reject("order has neither notional nor qty")),
        };
        let class = AssetClass::of_symbol(&order.symbol);
        let multiplier = if class == AssetClass::Option { 100.0 } else { 1.0 };
        let cost = qty * price * multiplier;

        let mut state = self.lock()?;
        match order.side {
            OrderSide::Buy => {
                if cost > state.cash {
                    return Err(reject("insufficient cash"));
                }
                state.cash -= cost;
                let position = state
                    .positions
                    .entry(order.symbol.clone())
                    .or_insert_with(|| BrokerPosition {
                        symbol: order.symbol.clone(),
                        asset_class: class,
                        qty: 0.0,
                        avg_entry_price: 0.0,
                        current_price: price,
                        market_value: 0.0,
                    });
                let total_qty = position.qty + qty;
                position.avg_entry_price =
                    (position.avg_entry_price * position.qty + price * qty) / total_qty;
                position.qty = total_qty;
                position.current_price = price;
                position.market_value = total_qty * price * multiplier;
            }
            OrderSide::Sell => {
                let position = state
                    .positions
                    .get_mut(&order.symbol)
                    .ok_or_else(|| reject("no position to sell"))?;
                let sold = qty.min(position.qty);
                position.qty -= sold;
                position.market_value = position.qty * price * multiplier;
                if position.qty <= 1e-12 {
                    state.positions.remove(&order.symbol);
                }
                state.cash += sold * price * multiplier;
            }
        }
        debug!("paper fill {} {:?} qty={:.6} @ {:.4}", order.symbol, order.side, qty, price);
        Ok(Self::ack("filled", Some(price)))
    }

    async fn close_position(&self, symbol: &str) -> Result<OrderAck> {
        if self.lock()?.rejected.contains(symbol) {
            return Err(Error::OrderRejected {
                symbol: symbol.to_string(),
                reason: "rejected by broker".into(),
            });
        }
        let price = self.price_of(symbol).await;
        let mut state = self.lock()?;
        let position = state.positions.remove(symbol).ok_or_else(|| Error::OrderRejected {
            symbol: symbol.to_string(),
            reason: "no open position".into(),
        })?;
        let exit_price = price.unwrap_or(position.current_price);
        let multiplier = if position.asset_class == AssetClass::Option { 100.0 } else { 1.0 };
        state.cash += position.qty * exit_price * multiplier;
        Ok(Self::ack("filled", Some(exit_price)))
    }

    async fn get_asset(&self, symbol: &str) -> Result<Asset> {
        let state = self.lock()?;
        Ok(state.assets.get(symbol).cloned().unwrap_or_else(|| Asset {
            symbol: symbol.to_string(),
            exchange: "NASDAQ".into(),
            tradable: true,
            class: AssetClass::of_symbol(symbol),
        }))
    }

    async fn list_assets(&self, filter: AssetFilter) -> Result<Vec<Asset>> {
        let state = self.lock()?;
        Ok(state
            .assets
            .values()
            .filter(|a| filter.class.map(|c| c == a.class).unwrap_or(true))
            .filter(|a| !filter.tradable_only || a.tradable)
            .cloned()
            .collect())
    }
}
