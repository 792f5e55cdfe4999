//! Cooperative cancellation of store calls and result streams.
//!
//! Dropping a returned future aborts the in-flight request. Streams keep
//! pulling pages after the call that created them returns, so they observe an
//! optional [`CancellationToken`] and end with [`Error::Cancelled`] instead of
//! silently truncating.

use std::future::Future;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::TRACING_TARGET_COLLECTION;
use crate::collection::ResultStream;
use crate::error::{Error, Result};

/// Stops a result stream once the token is cancelled.
///
/// The stream yields a terminal [`Error::Cancelled`] and ends; no further
/// pages are requested from the store.
pub fn cancellable_stream<T>(
    stream: ResultStream<T>,
    token: Option<CancellationToken>,
    operation: &'static str,
) -> ResultStream<T>
where
    T: Send + 'static,
{
    let Some(token) = token else {
        return stream;
    };

    Box::pin(async_stream::stream! {
        let mut stream = stream;
        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => None,
                item = stream.next() => Some(item),
            };

            match next {
                Some(Some(item)) => yield item,
                Some(None) => break,
                None => {
                    tracing::debug!(
                        target: TRACING_TARGET_COLLECTION,
                        operation = operation,
                        "Result stream cancelled"
                    );
                    yield Err(Error::cancelled(operation));
                    break;
                }
            }
        }
    })
}

/// Runs a future until it completes or the token is cancelled.
///
/// On cancellation the future is dropped, aborting its request.
pub async fn cancellable<T, F>(
    token: Option<&CancellationToken>,
    operation: &'static str,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let Some(token) = token else {
        return call.await;
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(Error::cancelled(operation)),
        result = call => result,
    }
}

#[cfg(test)]
mod tests {
    use futures::stream;

    use super::*;

    #[tokio::test]
    async fn passes_items_through_without_token() {
        let inner: ResultStream<i32> = Box::pin(stream::iter([Ok(1), Ok(2)]));
        let items: Vec<_> = cancellable_stream(inner, None, "search").collect().await;
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn ends_with_cancelled_error() {
        let token = CancellationToken::new();
        let inner: ResultStream<i32> = Box::pin(stream::iter([Ok(1), Ok(2), Ok(3)]));
        let mut stream = cancellable_stream(inner, Some(token.clone()), "search");

        assert_eq!(stream.next().await.unwrap().unwrap(), 1);
        token.cancel();

        let err = stream.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Cancelled { operation: "search" }));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn cancelled_call_is_dropped() {
        let token = CancellationToken::new();
        token.cancel();

        let result: Result<()> =
            cancellable(Some(&token), "get", futures::future::pending()).await;
        assert!(matches!(result, Err(Error::Cancelled { .. })));
    }
}
