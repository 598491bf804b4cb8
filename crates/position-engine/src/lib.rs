//! Position lifecycle: entry book, exit rules, staleness scoring, sizing.

pub mod exits;
pub mod lifecycle;
pub mod sizing;
pub mod staleness;

pub use exits::{ExitParams, ExitReason, ExitSignal};
pub use lifecycle::{PositionBook, SocialSample};
pub use sizing::{SizeDecision, SizingParams};
pub use staleness::{StalenessInput, StalenessParams};
