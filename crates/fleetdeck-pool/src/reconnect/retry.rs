//! Attempt sequence driver

use std::future::Future;

use fleetdeck_core::FleetError;

use super::RetryPolicy;

/// Every attempt of a sequence failed
#[derive(Debug)]
pub struct RetryExhausted {
    /// Attempts made, including the first
    pub attempts: u32,
    /// Error of the final attempt
    pub last_error: FleetError,
}

/// Run `attempt` until it succeeds or the policy's attempts are used up.
///
/// `attempt` receives the 1-based attempt number. `on_failure` is told about
/// every failed attempt before the policy's delay is slept.
pub async fn retry_with_backoff<T, F, Fut, N>(
    policy: &RetryPolicy,
    mut attempt: F,
    mut on_failure: N,
) -> Result<T, RetryExhausted>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = fleetdeck_core::Result<T>>,
    N: FnMut(u32, &FleetError),
{
    let max_attempts = policy.max_attempts();
    let mut number = 1u32;

    loop {
        match attempt(number).await {
            Ok(value) => return Ok(value),
            Err(err) => {
                on_failure(number, &err);

                if number >= max_attempts {
                    return Err(RetryExhausted {
                        attempts: number,
                        last_error: err,
                    });
                }

                let delay = policy.delay_for(number - 1);
                tracing::debug!(
                    attempt = number,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "connect attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                number += 1;
            }
        }
    }
}
