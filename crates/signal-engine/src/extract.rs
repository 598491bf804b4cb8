//! Ticker extraction and keyword sentiment.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

static DOLLAR_TICKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$([A-Za-z]{2,5})\b").expect("static regex")
});

static KEYWORD_TICKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b([A-Z]{2,5})\s+(?i:calls?|puts?|shares|stock|options|leaps|squeeze|earnings|breakout|to the moon|long|short|dd)\b",
    )
    .expect("static regex")
});

const STOP_WORDS: &[&str] = &[
    "A", "AI", "ALL", "AM", "AND", "API", "ARE", "ATH", "ATM", "BUT", "BUY", "CAN", "CEO", "CFO",
    "DD", "EOD", "EPS", "ETF", "EV", "FBI", "FDA", "FOMO", "FOR", "GDP", "HODL", "IMO", "IPO",
    "ITM", "IV", "LOL", "MOON", "NOT", "NYSE", "ONE", "OTM", "OUR", "OUT", "PM", "SEC", "SELL",
    "TA", "THE", "USA", "USD", "WAS", "WSB", "YOLO", "YOU", "JUST", "THIS", "THAT", "WITH",
    "LONG", "SHORT", "CALL", "PUT", "PUTS", "CALLS",
];

fn is_stop_word(candidate: &str) -> bool {
    STOP_WORDS.contains(&candidate)
}

/// Symbol candidates: 2-5 letters, `$`-prefixed or followed by a trading
/// keyword, minus the stop list. Sorted and deduplicated.
pub fn extract_tickers(text: &str) -> Vec<String> {
    let mut found = BTreeSet::new();

    for caps in DOLLAR_TICKER.captures_iter(text) {
        let ticker = caps[1].to_ascii_uppercase();
        if !is_stop_word(&ticker) {
            found.insert(ticker);
        }
    }
    for caps in KEYWORD_TICKER.captures_iter(text) {
        let ticker = caps[1].to_string();
        if !is_stop_word(&ticker) {
            found.insert(ticker);
        }
    }

    found.into_iter().collect()
}

const BULLISH: &[&str] = &[
    "moon", "rocket", "calls", "buy", "buying", "bull", "bullish", "long", "breakout", "squeeze",
    "undervalued", "upgrade", "beat", "rip", "pump", "green", "rally", "surge", "soar", "gains",
    "ath", "tendies",
];

const BEARISH: &[&str] = &[
    "puts", "sell", "selling", "bear", "bearish", "short", "crash", "dump", "overvalued",
    "downgrade", "miss", "red", "drop", "plunge", "tank", "bagholder", "rug", "fraud",
    "bankrupt", "fall", "dilution",
];

/// `(bull - bear) / (bull + bear)` over lexicon hits, 0 when nothing matches.
pub fn heuristic_sentiment(text: &str) -> f64 {
    let lowered = text.to_lowercase();
    let mut bull = 0u32;
    let mut bear = 0u32;

    for word in lowered.split(|c: char| !c.is_alphanumeric()) {
        if word.is_empty() {
            continue;
        }
        if BULLISH.contains(&word) {
            bull += 1;
        } else if BEARISH.contains(&word) {
            bear += 1;
        }
    }
    bull += lowered.matches('🚀').count() as u32;

    let total = bull + bear;
    if total == 0 {
        return 0.0;
    }
    (bull as f64 - bear as f64) / total as f64
}
