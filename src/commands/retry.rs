//! Retrying commands that failed with a transient error.
//!
//! Uses `backon` for exponential backoff with jitter. Only errors for which
//! [`Error::is_retryable`] holds are retried; business errors such as
//! `InsufficientPoints` are returned right away.

use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tower::{Service, ServiceExt};
use tracing::warn;

use crate::config::RetryConfig;

use super::Error;

/// Backoff built from the retry configuration
pub fn backoff(config: &RetryConfig) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(config.min_delay_ms))
        .with_max_delay(Duration::from_millis(config.max_delay_ms))
        .with_max_times(config.max_times)
        .with_jitter()
}

/// Send `request` to a clone of `service`, again after each retryable failure
pub async fn call_with_retry<Svc, Req>(
    service: &Svc,
    request: Req,
    config: &RetryConfig,
) -> Result<Svc::Response, Error>
where
    Svc: Service<Req, Error = Error> + Clone,
    Req: Clone,
{
    let attempt = || service.clone().oneshot(request.clone());

    attempt
        .retry(backoff(config))
        .when(Error::is_retryable)
        .notify(|err, delay| warn!("retrying in {:?} after: {}", delay, err))
        .await
}
