use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use common::providers::NotificationSink;
use common::{NotifyEvent, NotifyKind};
use tracing::{debug, info};

/// Sink that only logs.
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(&self, event: &NotifyEvent) {
        info!("NOTIFY [{:?}] {}: {}", event.kind, event.symbol, event.message);
    }
}

/// Drops repeats of the same `(symbol, kind)` inside the cooldown. Never
/// retries a failed send.
pub struct CooldownNotifier {
    inner: Arc<dyn NotificationSink>,
    cooldown: Duration,
    last_sent: Mutex<HashMap<(String, NotifyKind), DateTime<Utc>>>,
}

impl CooldownNotifier {
    pub fn new(inner: Arc<dyn NotificationSink>, cooldown: Duration) -> Self {
        Self {
            inner,
            cooldown,
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    fn admit(&self, event: &NotifyEvent, now: DateTime<Utc>) -> bool {
        let Ok(mut last_sent) = self.last_sent.lock() else {
            return true;
        };
        let key = (event.symbol.clone(), event.kind);
        match last_sent.get(&key) {
            Some(at) if now - *at < self.cooldown => false,
            _ => {
                last_sent.insert(key, now);
                true
            }
        }
    }

    /// Returns whether the event went out.
    pub async fn send(&self, event: NotifyEvent, now: DateTime<Utc>) -> bool {
        if !self.admit(&event, now) {
            debug!("notify suppressed by cooldown: {} {:?}", event.symbol, event.kind);
            return false;
        }
        self.inner.notify(&event).await;
        true
    }
}
