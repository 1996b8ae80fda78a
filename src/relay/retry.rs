//! Bounded retry with a fixed delay

use std::future::Future;
use std::time::Duration;

/// Run `op` up to `attempts` times, sleeping `delay` between attempts
///
/// Returns the first success or the error of the last attempt. There is no
/// sleep after the final failure. `attempts` below 1 is treated as 1.
pub async fn retry<T, E, F, Fut>(attempts: u32, delay: Duration, mut op: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= attempts => return Err(err),
            Err(_) => {
                attempt += 1;
                tokio::time::sleep(delay).await;
            }
        }
    }
}
