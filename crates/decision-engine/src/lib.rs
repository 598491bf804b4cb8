pub mod engine;
pub mod types;

pub use engine::ConfidenceComposer;
pub use types::*;
