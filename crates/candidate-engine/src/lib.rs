pub mod types;
pub mod scanner;
pub mod scorer;

pub use types::*;
pub use scanner::AlphaScanner;
pub use scorer::{aggregate_markets, alpha_confidence};
