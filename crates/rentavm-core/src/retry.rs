//! Bounded sequential retry for transient fetch failures.

use tracing::{error, warn};

use crate::errors::{AvmError, AvmResult};

/// Run `op` up to `max_retries` times, passing the 1-based attempt number.
///
/// Returns the first success. When every attempt fails the last error is
/// logged and [`AvmError::RetriesExhausted`] carrying `url` is returned.
/// Attempts follow each other immediately.
pub fn with_retries<T, F>(max_retries: u32, url: &str, mut op: F) -> AvmResult<T>
where
    F: FnMut(u32) -> AvmResult<T>,
{
    for attempt in 1..=max_retries {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) => warn!("Attempt {attempt}/{max_retries} failed for {url}: {e}"),
        }
    }
    let err = AvmError::RetriesExhausted {
        url: url.to_string(),
        attempts: max_retries,
    };
    error!("{err}");
    Err(err)
}
