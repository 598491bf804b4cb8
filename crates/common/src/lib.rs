//! Shared data model, error taxonomy, caches, and collaborator interfaces
//! for the sentiment desk.

pub mod asset;
pub mod cache;
pub mod error;
pub mod providers;
pub mod timeout;
pub mod types;

pub use asset::AssetClass;
pub use cache::TtlCache;
pub use error::Error;
pub use timeout::with_timeout;
pub use types::*;

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Clamp into the closed unit interval.
pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
