use std::sync::Arc;

use common::providers::BrokerageProvider;
use common::{with_timeout, AssetClass, OrderAck, OrderRequest, OrderSide, TimeInForce};
use decision_engine::TradeIntent;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    ShadowSkipped,
    LiveDisabled,
    Placed(OrderAck),
    Rejected(String),
}

impl ExecutionOutcome {
    pub fn ack(&self) -> Option<&OrderAck> {
        match self {
            ExecutionOutcome::Placed(ack) => Some(ack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OrderSize {
    Notional(f64),
    Qty(f64),
}

pub struct ExecutionEngine {
    broker: Arc<dyn BrokerageProvider>,
    shadow_mode: bool,
    live_enable: bool,
    call_timeout_ms: u64,
}

impl ExecutionEngine {
    pub fn new(
        broker: Arc<dyn BrokerageProvider>,
        shadow_mode: bool,
        live_enable: bool,
        call_timeout_ms: u64,
    ) -> Self {
        Self {
            broker,
            shadow_mode,
            live_enable,
            call_timeout_ms,
        }
    }

    pub fn shadow_mode(&self) -> bool {
        self.shadow_mode
    }

    fn gate(&self, what: &str, symbol: &str) -> Option<ExecutionOutcome> {
        if self.shadow_mode {
            info!("Shadow mode active - skipping {} for {}", what, symbol);
            return Some(ExecutionOutcome::ShadowSkipped);
        }
        if !self.live_enable {
            warn!("Live execution disabled - skipping {} for {}", what, symbol);
            return Some(ExecutionOutcome::LiveDisabled);
        }
        None
    }

    pub fn build_buy(intent: &TradeIntent, size: OrderSize) -> OrderRequest {
        let (notional, qty) = match size {
            OrderSize::Notional(n) => (Some(n), None),
            OrderSize::Qty(q) => (None, Some(q)),
        };
        OrderRequest {
            client_order_id: Uuid::new_v4().to_string(),
            symbol: intent.symbol.clone(),
            side: OrderSide::Buy,
            notional,
            qty,
            time_in_force: match intent.asset_class {
                AssetClass::Crypto => TimeInForce::Gtc,
                _ => TimeInForce::Day,
            },
            reason: intent.reasons.join("; "),
        }
    }

    pub async fn buy(&self, intent: &TradeIntent, size: OrderSize) -> ExecutionOutcome {
        let order = Self::build_buy(intent, size);
        info!(
            "EXECUTING: buy {} {:?} confidence={:.3}",
            order.symbol, size, intent.confidence
        );

        if let Some(outcome) = self.gate("order placement", &order.symbol) {
            return outcome;
        }

        let result = with_timeout(
            "create_order",
            self.call_timeout_ms,
            self.broker.create_order(&order),
        )
        .await;
        match result {
            Ok(ack) => {
                info!(
                    "Order placed successfully: ID={} Status={}",
                    ack.order_id, ack.status
                );
                ExecutionOutcome::Placed(ack)
            }
            Err(e) => {
                error!("Order placement failed for {}: {}", order.symbol, e);
                ExecutionOutcome::Rejected(e.to_string())
            }
        }
    }

    /// Close a held position. `Rejected` means the position is still open.
    pub async fn close(&self, symbol: &str, reason: &str) -> ExecutionOutcome {
        info!("EXECUTING: close {} ({})", symbol, reason);

        if let Some(outcome) = self.gate("close", symbol) {
            return outcome;
        }

        let result = with_timeout(
            "close_position",
            self.call_timeout_ms,
            self.broker.close_position(symbol),
        )
        .await;
        match result {
            Ok(ack) => {
                info!("Close placed: ID={} Status={}", ack.order_id, ack.status);
                ExecutionOutcome::Placed(ack)
            }
            Err(e) => {
                error!("Close failed for {}: {}", symbol, e);
                ExecutionOutcome::Rejected(e.to_string())
            }
        }
    }
}
