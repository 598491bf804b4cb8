//! Unified error type for the sentiment desk.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Network or API failure in an external collaborator.
    #[error("Provider unavailable ({provider}): {message}")]
    ProviderUnavailable { provider: String, message: String },

    /// Not tradable, wrong exchange, or outside the crypto universe.
    #[error("Asset ineligible: {symbol} ({reason})")]
    AssetIneligible { symbol: String, reason: String },

    #[error("Judge response unparseable: {0}")]
    JudgeParse(String),

    #[error("Rate budget exhausted: {kind} ({used}/{limit})")]
    RateBudgetExhausted { kind: String, used: u32, limit: u32 },

    #[error("Order rejected for {symbol}: {reason}")]
    OrderRejected { symbol: String, reason: String },

    #[error("Timed out after {ms}ms: {operation}")]
    Timeout { operation: String, ms: u64 },

    #[error("Config error: {0}")]
    Config(String),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn provider(provider: &str, message: impl ToString) -> Self {
        Error::ProviderUnavailable {
            provider: provider.to_string(),
            message: message.to_string(),
        }
    }

    /// Short stable code used in journal events.
    pub fn code(&self) -> &'static str {
        match self {
            Error::ProviderUnavailable { .. } => "PROVIDER_UNAVAILABLE",
            Error::AssetIneligible { .. } => "ASSET_INELIGIBLE",
            Error::JudgeParse(_) => "JUDGE_PARSE_ERROR",
            Error::RateBudgetExhausted { .. } => "RATE_BUDGET_EXHAUSTED",
            Error::OrderRejected { .. } => "ORDER_REJECTED",
            Error::Timeout { .. } => "TIMEOUT",
            Error::Config(_) => "CONFIG",
            Error::Json(_) => "JSON",
            Error::Io(_) => "IO",
            Error::Other(_) => "OTHER",
        }
    }
}
