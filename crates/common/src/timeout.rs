//! Deadline wrapper for collaborator calls. The scheduler has no supervisory
//! timeout of its own, so every external call goes through here.

use std::future::Future;
use std::time::Duration;

use crate::{Error, Result};

pub async fn with_timeout<T, F>(operation: &str, ms: u64, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(Duration::from_millis(ms), fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: operation.to_string(),
            ms,
        }),
    }
}
