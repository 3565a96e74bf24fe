use crate::args::Args;
use crate::stream::DataStream;
use async_trait::async_trait;
use farcall_core::{DispatchError, ReferenceId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The capability that moves an invocation to the host and brings the result back.
///
/// Implementations own serialization, transport and the matching of responses
/// to pending calls. Handles only ever see this trait.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Invokes `method` on the object identified by `target` and returns the raw result.
    async fn invoke(
        &self,
        target: ReferenceId,
        method: &str,
        args: Args,
        cancel: Option<CancellationToken>,
    ) -> Result<Value, DispatchError>;

    /// Invokes `method` on `target`, discarding any result.
    async fn invoke_void(
        &self,
        target: ReferenceId,
        method: &str,
        args: Args,
        cancel: Option<CancellationToken>,
    ) -> Result<(), DispatchError>;

    /// Opens a stream over the binary content of `target` delivering at most `max_length` bytes.
    async fn open_stream(
        &self,
        target: ReferenceId,
        max_length: u64,
        cancel: Option<CancellationToken>,
    ) -> Result<DataStream, DispatchError>;
}

#[async_trait]
impl<D: Dispatcher + ?Sized> Dispatcher for Arc<D> {
    async fn invoke(
        &self,
        target: ReferenceId,
        method: &str,
        args: Args,
        cancel: Option<CancellationToken>,
    ) -> Result<Value, DispatchError> {
        (**self).invoke(target, method, args, cancel).await
    }

    async fn invoke_void(
        &self,
        target: ReferenceId,
        method: &str,
        args: Args,
        cancel: Option<CancellationToken>,
    ) -> Result<(), DispatchError> {
        (**self).invoke_void(target, method, args, cancel).await
    }

    async fn open_stream(
        &self,
        target: ReferenceId,
        max_length: u64,
        cancel: Option<CancellationToken>,
    ) -> Result<DataStream, DispatchError> {
        (**self).open_stream(target, max_length, cancel).await
    }
}

/// Decodes a raw invocation result into the shape the caller asked for.
pub fn decode_result<T: DeserializeOwned>(value: Value) -> Result<T, DispatchError> {
    serde_json::from_value(value).map_err(|err| {
        DispatchError::decode(format!(
            "cannot decode result as {}: {err}",
            std::any::type_name::<T>()
        ))
    })
}

/// Races `operation` against an optional cancellation token.
///
/// A token that is already cancelled wins before `operation` is polled, so
/// nothing is sent. Once cancelled, a late result from `operation` is dropped.
pub async fn cancellable<F, T>(
    cancel: Option<&CancellationToken>,
    operation: F,
) -> Result<T, DispatchError>
where
    F: Future<Output = Result<T, DispatchError>>,
{
    match cancel {
        None => operation.await,
        Some(token) => {
            tokio::select! {
                biased;
                _ = token.cancelled() => Err(DispatchError::cancelled()),
                result = operation => result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use farcall_core::DispatchErrorKind;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn test_decode_result() {
        let greeting: String = decode_result(json!("hello")).unwrap();
        assert_eq!(greeting, "hello");

        let err = decode_result::<u32>(json!("not a number")).unwrap_err();
        assert_eq!(err.kind(), DispatchErrorKind::DecodeError);
        assert!(err.message().contains("u32"));
    }

    #[tokio::test]
    async fn test_precancelled_token_never_polls_operation() {
        let token = CancellationToken::new();
        token.cancel();
        let polled = AtomicBool::new(false);

        let result = cancellable(Some(&token), async {
            polled.store(true, Ordering::SeqCst);
            Ok::<_, DispatchError>(1)
        })
        .await;

        assert!(result.unwrap_err().is_cancelled());
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_cancel_while_pending() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });

        let result: Result<(), _> = cancellable(Some(&token), std::future::pending()).await;
        assert!(result.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_without_token_passes_through() {
        let result = cancellable(None, async { Err::<(), _>(DispatchError::disconnected("gone")) }).await;
        assert_eq!(result.unwrap_err().kind(), DispatchErrorKind::Disconnected);
    }
}
