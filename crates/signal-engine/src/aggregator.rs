//! Per-source aggregation of raw mentions into `Signal`s.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};
use common::{AssetClass, Mention, Signal, SourceBatch};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extract::{extract_tickers, heuristic_sentiment};
use crate::weighting::{engagement_multiplier, flair_multiplier, time_decay};

/// How a source is gated on mention count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Forums and subreddits: at least 2 mentions.
    Crowd,
    /// Busy single-venue streams: at least 5 mentions.
    HighVolume,
    /// Momentum feeds and manual watchlists: no mention-count gate.
    Special,
}

impl SourceKind {
    pub fn min_mentions(&self) -> usize {
        match self {
            SourceKind::Crowd => 2,
            SourceKind::HighVolume => 5,
            SourceKind::Special => 1,
        }
    }
}

/// Static trust profile for one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceProfile {
    pub name: String,
    pub weight: f64,
    pub kind: SourceKind,
    /// Symbols from this source are crypto bases (`BTC` -> `BTC/USD`).
    #[serde(default)]
    pub crypto: bool,
}

#[derive(Debug, Clone)]
struct Scored {
    sentiment: f64,
    quality: f64,
    decay: f64,
    momentum: Option<f64>,
    price: Option<f64>,
    detail: Option<String>,
}

pub struct SignalAggregator {
    half_life_minutes: f64,
    sources: Vec<SourceProfile>,
    default_weight: f64,
}

impl SignalAggregator {
    pub fn new(half_life_minutes: f64, sources: Vec<SourceProfile>, default_weight: f64) -> Self {
        Self {
            half_life_minutes,
            sources,
            default_weight: default_weight.clamp(0.0, 1.0),
        }
    }

    fn profile(&self, source: &str) -> SourceProfile {
        self.sources
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(source))
            .cloned()
            .unwrap_or_else(|| SourceProfile {
                name: source.to_string(),
                weight: self.default_weight,
                kind: SourceKind::Crowd,
                crypto: false,
            })
    }

    fn normalize_symbol(symbol: &str, crypto: bool) -> String {
        let upper = symbol.trim().trim_start_matches('$').to_ascii_uppercase();
        if crypto && !upper.contains('/') {
            format!("{}/USD", upper)
        } else {
            upper
        }
    }

    fn mention_sentiment(mention: &Mention) -> f64 {
        let lexical = heuristic_sentiment(&mention.text);
        if lexical != 0.0 {
            return lexical;
        }
        // Momentum feeds rarely carry words; fall back to the move itself.
        mention
            .momentum
            .map(|m| (m / 10.0).clamp(-1.0, 1.0))
            .unwrap_or(0.0)
    }

    /// Aggregate one source batch into at most one signal per symbol.
    pub fn aggregate_batch(&self, batch: &SourceBatch, now: DateTime<Utc>) -> Vec<Signal> {
        let profile = self.profile(&batch.source);
        let source_weight = profile.weight.clamp(0.0, 1.0);

        let mut seen: HashSet<(&str, DateTime<Utc>)> = HashSet::new();
        let mut by_symbol: BTreeMap<String, Vec<Scored>> = BTreeMap::new();

        for mention in &batch.mentions {
            if !seen.insert((mention.text.as_str(), mention.timestamp)) {
                continue;
            }

            let symbols = match &mention.symbol {
                Some(symbol) => vec![Self::normalize_symbol(symbol, profile.crypto)],
                None => extract_tickers(&mention.text)
                    .into_iter()
                    .map(|t| Self::normalize_symbol(&t, profile.crypto))
                    .collect(),
            };
            if symbols.is_empty() {
                continue;
            }

            let age_minutes = (now - mention.timestamp).num_seconds() as f64 / 60.0;
            let decay = time_decay(age_minutes, self.half_life_minutes);
            let engagement = engagement_multiplier(mention.upvotes, mention.comments);
            let flair = flair_multiplier(mention.flair.as_deref());
            let quality = decay * engagement * flair * source_weight;
            let sentiment = Self::mention_sentiment(mention);

            for symbol in symbols {
                by_symbol.entry(symbol).or_default().push(Scored {
                    sentiment,
                    quality,
                    decay,
                    momentum: mention.momentum,
                    price: mention.price,
                    detail: mention.source_detail.clone(),
                });
            }
        }

        let min_mentions = profile.kind.min_mentions();
        let mut signals = Vec::new();

        for (symbol, scored) in by_symbol {
            if scored.len() < min_mentions {
                debug!(
                    "{}: {} mentions on {} below minimum {}",
                    symbol,
                    scored.len(),
                    batch.source,
                    min_mentions
                );
                continue;
            }

            let count = scored.len() as f64;
            let raw_sentiment = scored.iter().map(|s| s.sentiment).sum::<f64>() / count;
            let weighted_sentiment = if scored.iter().any(|s| s.quality > 0.0) {
                scored.iter().map(|s| s.sentiment * s.quality).sum::<f64>() / count
            } else {
                raw_sentiment * 0.5
            };
            let freshness = scored.iter().map(|s| s.decay).sum::<f64>() / count;

            let momenta: Vec<f64> = scored.iter().filter_map(|s| s.momentum).collect();
            let momentum = if momenta.is_empty() {
                None
            } else {
                Some(momenta.iter().sum::<f64>() / momenta.len() as f64)
            };
            let price = scored.iter().rev().find_map(|s| s.price);
            let source_detail = most_common_detail(&scored).unwrap_or_else(|| batch.source.clone());
            let is_crypto = profile.crypto || AssetClass::of_symbol(&symbol) == AssetClass::Crypto;

            signals.push(Signal {
                reason: format!(
                    "{} mentions on {} (raw {:.2}, weighted {:.2})",
                    scored.len(),
                    batch.source,
                    raw_sentiment,
                    weighted_sentiment
                ),
                symbol,
                source: batch.source.clone(),
                source_detail,
                raw_sentiment,
                sentiment: weighted_sentiment.clamp(-1.0, 1.0),
                volume: scored.len() as u32,
                freshness,
                source_weight,
                momentum,
                price,
                is_crypto,
                timestamp: now,
            });
        }

        signals
    }

    /// Aggregate every batch and concatenate in batch order.
    pub fn aggregate(&self, batches: &[SourceBatch], now: DateTime<Utc>) -> Vec<Signal> {
        batches
            .iter()
            .flat_map(|batch| self.aggregate_batch(batch, now))
            .collect()
    }
}

fn most_common_detail(scored: &[Scored]) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for detail in scored.iter().filter_map(|s| s.detail.as_deref()) {
        *counts.entry(detail).or_insert(0) += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(detail, _)| detail.to_string())
}
