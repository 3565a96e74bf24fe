//! Caller-side handles to objects living on a host.
//!
//! A [`RemoteReference`] is nothing more than an identifier, a shared
//! dispatcher and a disposal flag. It exposes two capability views:
//! [`ObjectReference`] for named-method invocation and [`DataReference`] for
//! streaming the object's binary content. Callers depend on the view they
//! need; one handle satisfies both.

use crate::error::FarcallError;
use async_trait::async_trait;
use farcall_core::{
    DispatchError, DisposeFlag, ObjectDisposedError, RELEASE_METHOD, ReferenceId, ReferenceMarker,
};
use farcall_transport::{
    Args, CancellationToken, DataStream, Dispatcher, cancellable, decode_result,
};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, instrument, trace, warn};

/// Explicit, idempotent release of a remote resource.
#[async_trait]
pub trait AsyncDispose: Send + Sync {
    fn is_disposed(&self) -> bool;

    /// Releases the remote resource.
    ///
    /// Only the first call does anything; later and concurrent calls return
    /// `Ok(())` without contacting the host. Once this has started, every
    /// invocation on the handle fails fast with [`ObjectDisposedError`].
    async fn dispose(&self) -> Result<(), FarcallError>;
}

/// Named-method invocation on a remote object.
///
/// The disposed check runs when the returned future is first polled, not
/// when the method is called. A call future created before
/// [`dispose`](AsyncDispose::dispose) and awaited afterwards fails with
/// [`ObjectDisposedError`] without reaching the dispatcher.
#[async_trait]
pub trait ObjectReference: AsyncDispose {
    fn id(&self) -> ReferenceId;

    /// Invokes `method` and returns the undecoded result.
    async fn invoke_value(
        &self,
        method: &str,
        args: Args,
        cancel: Option<CancellationToken>,
    ) -> Result<Value, FarcallError>;

    /// Invokes `method`, discarding any result.
    async fn invoke_void(
        &self,
        method: &str,
        args: Args,
        cancel: Option<CancellationToken>,
    ) -> Result<(), FarcallError>;

    /// Invokes `method` and decodes the result as `T`.
    async fn invoke<T>(&self, method: &str, args: Args) -> Result<T, FarcallError>
    where
        T: DeserializeOwned + Send,
        Self: Sized,
    {
        let value = self.invoke_value(method, args, None).await?;
        Ok(decode_result(value)?)
    }

    /// Like [`invoke`](Self::invoke), aborting with a cancellation error when `cancel` fires.
    async fn invoke_with_cancellation<T>(
        &self,
        method: &str,
        args: Args,
        cancel: CancellationToken,
    ) -> Result<T, FarcallError>
    where
        T: DeserializeOwned + Send,
        Self: Sized,
    {
        let value = self.invoke_value(method, args, Some(cancel)).await?;
        Ok(decode_result(value)?)
    }
}

/// Bounded streaming of a remote object's binary content.
#[async_trait]
pub trait DataReference: AsyncDispose {
    /// Opens a stream delivering at most `max_length` bytes.
    ///
    /// This does not consult the local disposal flag: a released identifier
    /// is rejected by the host and surfaces as a dispatch failure.
    async fn open_data_stream(
        &self,
        max_length: u64,
        cancel: Option<CancellationToken>,
    ) -> Result<DataStream, FarcallError>;
}

/// Handle to one object on the host, addressed by its [`ReferenceId`].
///
/// Not `Clone`: share it behind an `Arc` so every user observes the same
/// disposal state.
pub struct RemoteReference {
    id: ReferenceId,
    dispatcher: Arc<dyn Dispatcher>,
    state: DisposeFlag,
}

impl RemoteReference {
    /// Binds a handle to an identifier the caller already knows.
    pub fn new(dispatcher: Arc<dyn Dispatcher>, id: ReferenceId) -> Self {
        Self {
            id,
            dispatcher,
            state: DisposeFlag::new(),
        }
    }

    /// Binds a handle to a reference-shaped result returned by the host.
    pub fn from_value(dispatcher: Arc<dyn Dispatcher>, value: &Value) -> Result<Self, FarcallError> {
        match ReferenceMarker::from_value(value) {
            Some(marker) => Ok(Self::new(dispatcher, marker.id)),
            None => Err(DispatchError::decode(format!(
                "expected a reference-shaped result, got {value}"
            ))
            .into()),
        }
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Invokes `method` and wraps the reference-shaped result in a new handle
    /// sharing this handle's dispatcher.
    pub async fn invoke_reference(
        &self,
        method: &str,
        args: Args,
    ) -> Result<RemoteReference, FarcallError> {
        let value = self.invoke_value(method, args, None).await?;
        Self::from_value(Arc::clone(&self.dispatcher), &value)
    }

    fn ensure_live(&self) -> Result<(), ObjectDisposedError> {
        if self.state.is_disposed() {
            return Err(ObjectDisposedError::for_type::<Self>(self.id));
        }
        Ok(())
    }
}

impl fmt::Debug for RemoteReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteReference")
            .field("id", &self.id)
            .field("disposed", &self.state.is_disposed())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AsyncDispose for RemoteReference {
    fn is_disposed(&self) -> bool {
        self.state.is_disposed()
    }

    #[instrument(level = "debug", skip(self), fields(id = %self.id))]
    async fn dispose(&self) -> Result<(), FarcallError> {
        if !self.state.try_dispose() {
            trace!("reference already disposed");
            return Ok(());
        }

        let dispatcher = Arc::clone(&self.dispatcher);
        let id = self.id;
        let release = async move {
            dispatcher
                .invoke_void(id, RELEASE_METHOD, Args::none(), None)
                .await
        };

        // On its own task the release survives the caller dropping this future.
        let outcome = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => match runtime.spawn(release).await {
                Ok(outcome) => outcome,
                Err(join) => Err(DispatchError::disconnected(format!(
                    "release task did not complete: {join}"
                ))),
            },
            Err(_) => release.await,
        };

        match outcome {
            Ok(()) => {
                debug!("remote reference released");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "release notification failed; host may keep the object");
                Err(err.into())
            }
        }
    }
}

#[async_trait]
impl ObjectReference for RemoteReference {
    fn id(&self) -> ReferenceId {
        self.id
    }

    #[instrument(level = "trace", skip(self, args, cancel), fields(id = %self.id))]
    async fn invoke_value(
        &self,
        method: &str,
        args: Args,
        cancel: Option<CancellationToken>,
    ) -> Result<Value, FarcallError> {
        self.ensure_live()?;
        let call = self.dispatcher.invoke(self.id, method, args, cancel.clone());
        Ok(cancellable(cancel.as_ref(), call).await?)
    }

    #[instrument(level = "trace", skip(self, args, cancel), fields(id = %self.id))]
    async fn invoke_void(
        &self,
        method: &str,
        args: Args,
        cancel: Option<CancellationToken>,
    ) -> Result<(), FarcallError> {
        self.ensure_live()?;
        let call = self
            .dispatcher
            .invoke_void(self.id, method, args, cancel.clone());
        Ok(cancellable(cancel.as_ref(), call).await?)
    }
}

#[async_trait]
impl DataReference for RemoteReference {
    #[instrument(level = "trace", skip(self, cancel), fields(id = %self.id))]
    async fn open_data_stream(
        &self,
        max_length: u64,
        cancel: Option<CancellationToken>,
    ) -> Result<DataStream, FarcallError> {
        let open = self
            .dispatcher
            .open_stream(self.id, max_length, cancel.clone());
        let opened = cancellable(cancel.as_ref(), open).await?;

        // The budget holds whatever stream the dispatcher handed back.
        let bounded = DataStream::new(opened.boxed(), max_length);
        Ok(match cancel {
            Some(token) => bounded.with_cancellation(token),
            None => bounded,
        })
    }
}

impl Drop for RemoteReference {
    fn drop(&mut self) {
        if !self.state.is_disposed() {
            debug!(id = %self.id, "remote reference dropped without dispose; host keeps the object");
        }
    }
}
