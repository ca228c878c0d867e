//! Bounded, cancellable waits on asynchronous operations.
//!
//! [`wait_for`] turns any future yielding `Result<T, CoreError>` into a wait
//! that ends on completion, timeout, or cancellation, and classifies the
//! outcome. It only stops waiting: an abandoned operation keeps running and
//! its late result is discarded by whoever would have delivered it.
//!
//! [`acked`] adapts a transport [`Ack`](fleetprov_mqtt::Ack) to the same
//! error type.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::CoreError;

/// Upper bound for every network step unless the caller says otherwise.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Wait for `operation`, bounded by `timeout` and `cancel`.
///
/// - elapsed timeout: [`CoreError::Timeout`] (retryable)
/// - cancellation: [`CoreError::Interrupted`]
/// - operation failure: returned as-is
pub async fn wait_for<T, F>(
    operation: F,
    timeout: Duration,
    cancel: &CancellationToken,
    context: &str,
) -> Result<T, CoreError>
where
    F: Future<Output = Result<T, CoreError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::debug!(context, "wait interrupted");
            Err(CoreError::Interrupted { context: context.to_owned() })
        }
        outcome = tokio::time::timeout(timeout, operation) => match outcome {
            Ok(result) => {
                if let Err(e) = &result {
                    log_failure(e, context);
                }
                result
            }
            Err(_) => {
                tracing::warn!(
                    context,
                    timeout_secs = timeout.as_secs(),
                    retryable = true,
                    "operation timed out"
                );
                Err(CoreError::Timeout {
                    context: context.to_owned(),
                    timeout_secs: timeout.as_secs(),
                })
            }
        },
    }
}

/// Map a transport acknowledgement into the core error taxonomy.
pub async fn acked<T>(ack: fleetprov_mqtt::Ack<T>, context: &str) -> Result<T, CoreError> {
    ack.await.map_err(|e| CoreError::transport(context, e))
}

fn log_failure(err: &CoreError, context: &str) {
    if err.is_retryable() {
        tracing::warn!(context, error = %err, retryable = true, "operation failed");
    } else if !err.is_interrupted() {
        tracing::error!(context, error = %err, kind = %err.kind(), "operation failed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use fleetprov_mqtt::Ack;

    use super::*;
    use crate::error::ErrorKind;

    #[tokio::test(start_paused = true)]
    async fn completes_with_value() {
        let cancel = CancellationToken::new();
        let value = wait_for(async { Ok(42) }, Duration::from_secs(1), &cancel, "op")
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test(start_paused = true)]
    async fn never_completing_operation_times_out_as_retryable() {
        let cancel = CancellationToken::new();
        let err = wait_for(
            std::future::pending::<Result<(), CoreError>>(),
            Duration::from_secs(5),
            &cancel,
            "subscribe accepted",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Timeout { timeout_secs: 5, .. }));
        assert_eq!(err.kind(), ErrorKind::Retryable);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_is_interrupted() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_for(async { Ok(()) }, DEFAULT_OPERATION_TIMEOUT, &cancel, "op")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Interrupted);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_timeout_stays_retryable() {
        let cancel = CancellationToken::new();
        let ack = Ack::<u16>::failed(fleetprov_mqtt::Error::Client("request timed out".into()));
        let outcome = acked(ack, "publish");
        let err = wait_for(outcome, DEFAULT_OPERATION_TIMEOUT, &cancel, "publish")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::TransportTimeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn other_transport_failure_is_fatal() {
        let cancel = CancellationToken::new();
        let ack = Ack::<u16>::failed(fleetprov_mqtt::Error::SubscribeRejected {
            topic: "t".into(),
        });
        let outcome = acked(ack, "subscribe");
        let err = wait_for(outcome, DEFAULT_OPERATION_TIMEOUT, &cancel, "subscribe")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Fatal);
    }
}
