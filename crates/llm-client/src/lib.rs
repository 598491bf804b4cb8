pub mod client;
pub mod types;

pub use client::AnthropicJudge;
pub use types::*;
