pub mod engine;
pub mod paper;

pub use engine::{ExecutionEngine, ExecutionOutcome, OrderSize};
pub use paper::PaperBroker;
