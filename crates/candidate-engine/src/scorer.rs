use std::collections::BTreeMap;

use common::{clamp01, AggregatedMarket, Bar, Signal, Snapshot};

/// Roll cached signals up per symbol, highest mean sentiment first, capped
/// at `max`.
pub fn aggregate_markets(signals: &[Signal], max: usize) -> Vec<AggregatedMarket> {
    let mut grouped: BTreeMap<&str, Vec<&Signal>> = BTreeMap::new();
    for signal in signals {
        grouped.entry(signal.symbol.as_str()).or_default().push(signal);
    }

    let mut markets: Vec<AggregatedMarket> = grouped
        .into_iter()
        .map(|(symbol, group)| {
            let count = group.len() as f64;
            let momenta: Vec<f64> = group.iter().filter_map(|s| s.momentum).collect();
            let mut sources: Vec<String> = group.iter().map(|s| s.source.clone()).collect();
            sources.sort();
            sources.dedup();
            AggregatedMarket {
                symbol: symbol.to_string(),
                is_crypto: group.iter().any(|s| s.is_crypto),
                sentiment_avg: group.iter().map(|s| s.sentiment).sum::<f64>() / count,
                momentum_avg: if momenta.is_empty() {
                    None
                } else {
                    Some(momenta.iter().sum::<f64>() / momenta.len() as f64)
                },
                total_volume: group.iter().map(|s| s.volume).sum(),
                sources,
            }
        })
        .collect();

    markets.sort_by(|a, b| {
        b.sentiment_avg
            .total_cmp(&a.sentiment_avg)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
    markets.truncate(max);
    markets
}

/// Close-to-close daily return from the snapshot's two daily bars.
pub fn daily_return(snapshot: &Snapshot) -> Option<f64> {
    let close = snapshot.daily_bar?.close;
    let prev = snapshot.prev_daily_bar?.close;
    if prev <= 0.0 {
        return None;
    }
    Some((close - prev) / prev)
}

fn close_returns(bars: &[Bar]) -> Vec<f64> {
    bars.windows(2)
        .filter(|w| w[0].close > 0.0)
        .map(|w| (w[1].close - w[0].close) / w[0].close)
        .collect()
}

/// Mean absolute daily return over the trailing window, if enough history.
pub fn avg_abs_return(bars: &[Bar], min_returns: usize) -> Option<f64> {
    let returns = close_returns(bars);
    if returns.len() < min_returns.max(1) {
        return None;
    }
    let avg = returns.iter().map(|r| r.abs()).sum::<f64>() / returns.len() as f64;
    (avg > 0.0).then_some(avg)
}

/// Fraction of positive close-to-close days over the trailing window.
pub fn up_day_fraction(bars: &[Bar], min_returns: usize) -> Option<f64> {
    let returns = close_returns(bars);
    if returns.len() < min_returns.max(1) {
        return None;
    }
    let ups = returns.iter().filter(|r| **r > 0.0).count();
    Some(ups as f64 / returns.len() as f64)
}

/// Probability the market already prices in, from today's move normalised
/// by typical volatility.
pub fn implied_prob(daily_return: f64, avg_abs_return: f64) -> f64 {
    let normalized = if avg_abs_return > 0.0 {
        daily_return / (2.0 * avg_abs_return)
    } else {
        0.0
    };
    clamp01(0.5 + normalized.clamp(-0.5, 0.5))
}

/// Returns `(implied, calculated)` for an equity.
pub fn equity_probabilities(
    sentiment_avg: f64,
    daily_return: f64,
    history: &[Bar],
    min_history: usize,
) -> (f64, f64) {
    let avg_abs = avg_abs_return(history, min_history).unwrap_or(daily_return.abs().max(0.02));
    let implied = implied_prob(daily_return, avg_abs);

    let sentiment_prob = clamp01(sentiment_avg);
    let calculated = match up_day_fraction(history, min_history) {
        Some(up) => clamp01(0.6 * sentiment_prob + 0.4 * up),
        None => sentiment_prob,
    };
    (implied, calculated)
}

/// Returns `(implied, calculated)` for crypto. The implied baseline is
/// uninformative, so it is pinned at 0.5.
pub fn crypto_probabilities(sentiment_avg: f64, momentum_avg: Option<f64>) -> (f64, f64) {
    let momentum_prob = clamp01(0.5 + (momentum_avg.unwrap_or(0.0) / 10.0).clamp(-0.4, 0.4));
    let sentiment_prob = clamp01(sentiment_avg);
    (0.5, clamp01(0.7 * momentum_prob + 0.3 * sentiment_prob))
}

/// Map alpha onto a confidence: the gating threshold maps to 0.5, stronger
/// edges saturate toward 1.
pub fn alpha_confidence(alpha: f64, threshold: f64) -> f64 {
    let span = (1.0 - threshold).max(0.05);
    clamp01(0.5 + 0.5 * (alpha - threshold) / span)
}
