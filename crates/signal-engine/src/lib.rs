pub mod aggregator;
pub mod eligibility;
pub mod extract;
pub mod weighting;

pub use aggregator::{SignalAggregator, SourceKind, SourceProfile};
pub use eligibility::EligibilityFilter;
pub use extract::{extract_tickers, heuristic_sentiment};
pub use weighting::{engagement_multiplier, flair_multiplier, time_decay};
