//! In-process host and dispatcher.
//!
//! The loopback host serves invocations from a queue on the current tokio
//! runtime. It behaves like a remote host as far as handles can tell: calls
//! are asynchronous, results travel back by message, objects are addressed
//! only by [`ReferenceId`], and shutting the host down fails every
//! outstanding and later call with [`DispatchErrorKind::Disconnected`].
//!
//! [`DispatchErrorKind::Disconnected`]: farcall_core::DispatchErrorKind::Disconnected

use crate::args::Args;
use crate::config::DispatcherConfig;
use crate::dispatcher::{Dispatcher, cancellable};
use crate::stream::{ChunkStream, DataStream};
use async_trait::async_trait;
use bytes::Bytes;
use farcall_core::{
    DispatchError, RELEASE_METHOD, ReferenceId, ReferenceMarker, ReferenceRegistry, RegistryError,
};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

/// Failure raised by a host object while running a call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HostError(String);

impl HostError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// What a host object hands back from a call.
pub enum HostReply {
    Value(Value),
    Void,
    /// An object that cannot be copied by value. The host tracks it and the
    /// caller receives a reference-shaped result instead.
    Object(Arc<dyn HostObject>),
}

/// An object living on the host side.
#[async_trait]
pub trait HostObject: Send + Sync {
    async fn call(&self, method: &str, args: Args) -> Result<HostReply, HostError>;

    /// Binary content exposed to data streams, if any.
    fn data(&self) -> Option<Bytes> {
        None
    }
}

/// A host object that is nothing but binary content.
pub struct HostBlob(Bytes);

impl HostBlob {
    pub fn new(content: impl Into<Bytes>) -> Self {
        Self(content.into())
    }
}

#[async_trait]
impl HostObject for HostBlob {
    async fn call(&self, method: &str, _args: Args) -> Result<HostReply, HostError> {
        match method {
            "size" => Ok(HostReply::Value(Value::from(self.0.len() as u64))),
            other => Err(HostError::new(format!("blob has no method '{other}'"))),
        }
    }

    fn data(&self) -> Option<Bytes> {
        Some(self.0.clone())
    }
}

enum Request {
    Invoke {
        target: ReferenceId,
        method: String,
        args: Args,
        reply: oneshot::Sender<Result<Value, DispatchError>>,
    },
    OpenStream {
        target: ReferenceId,
        max_length: u64,
        reply: oneshot::Sender<Result<mpsc::Receiver<Bytes>, DispatchError>>,
    },
}

struct HostState {
    global: Arc<dyn HostObject>,
    registry: ReferenceRegistry<Arc<dyn HostObject>>,
    config: DispatcherConfig,
    shutdown: CancellationToken,
}

fn registry_failure(err: RegistryError) -> DispatchError {
    match err {
        RegistryError::Closed => DispatchError::disconnected(err.to_string()),
        RegistryError::NotFound(_) | RegistryError::Released(_) => {
            DispatchError::host_exception(err.to_string())
        }
    }
}

impl HostState {
    fn lookup(&self, target: ReferenceId) -> Result<Arc<dyn HostObject>, DispatchError> {
        if target.is_global() {
            if self.registry.is_closed() {
                return Err(registry_failure(RegistryError::Closed));
            }
            return Ok(Arc::clone(&self.global));
        }
        self.registry.get(target).map_err(registry_failure)
    }

    fn release(&self, target: ReferenceId) -> Result<(), DispatchError> {
        if target.is_global() {
            return Err(DispatchError::host_exception(
                "the global object cannot be released",
            ));
        }
        self.registry.release(target).map_err(registry_failure)?;
        debug!(%target, live = self.registry.live_count(), "host released reference");
        Ok(())
    }

    async fn invoke(
        &self,
        target: ReferenceId,
        method: &str,
        args: Args,
    ) -> Result<Value, DispatchError> {
        if method == RELEASE_METHOD {
            return self.release(target).map(|()| Value::Null);
        }

        let object = self.lookup(target)?;
        match object.call(method, args).await {
            Ok(HostReply::Value(value)) => Ok(value),
            Ok(HostReply::Void) => Ok(Value::Null),
            Ok(HostReply::Object(object)) => {
                let id = self.registry.track(object).map_err(registry_failure)?;
                trace!(%target, %id, "host handed out reference");
                Ok(ReferenceMarker::new(id).into_value())
            }
            Err(err) => Err(DispatchError::host_exception(format!(
                "'{method}' on {target} failed: {err}"
            ))),
        }
    }

    fn open_stream(
        &self,
        target: ReferenceId,
        max_length: u64,
    ) -> Result<mpsc::Receiver<Bytes>, DispatchError> {
        let object = self.lookup(target)?;
        let content = object.data().ok_or_else(|| {
            DispatchError::host_exception(format!("{target} has no binary content"))
        })?;

        let limit = usize::try_from(max_length).map_or(content.len(), |max| max.min(content.len()));
        let content = content.slice(..limit);
        let chunk_size = self.config.stream_chunk_size();
        let (sender, receiver) = mpsc::channel(self.config.stream_buffer());
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let mut offset = 0;
            while offset < content.len() {
                let end = (offset + chunk_size).min(content.len());
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    sent = sender.send(content.slice(offset..end)) => {
                        if sent.is_err() {
                            trace!(%target, "stream reader went away");
                            return;
                        }
                    }
                }
                offset = end;
            }
        });

        Ok(receiver)
    }

    async fn handle(&self, request: Request) {
        match request {
            Request::Invoke {
                target,
                method,
                args,
                reply,
            } => {
                let result = tokio::select! {
                    biased;
                    // Dropping `reply` tells the caller the host is gone.
                    _ = self.shutdown.cancelled() => return,
                    result = self.invoke(target, &method, args) => result,
                };
                if reply.send(result).is_err() {
                    trace!(%target, %method, "caller stopped waiting for result");
                }
            }
            Request::OpenStream {
                target,
                max_length,
                reply,
            } => {
                if reply.send(self.open_stream(target, max_length)).is_err() {
                    trace!(%target, "caller stopped waiting for stream");
                }
            }
        }
    }
}

async fn serve(state: Arc<HostState>, mut requests: mpsc::Receiver<Request>) {
    loop {
        tokio::select! {
            biased;
            _ = state.shutdown.cancelled() => break,
            request = requests.recv() => match request {
                Some(request) => {
                    let state = Arc::clone(&state);
                    tokio::spawn(async move { state.handle(request).await });
                }
                None => break,
            },
        }
    }
    // Queued requests are dropped with their reply channels.
    requests.close();
    debug!("loopback host stopped serving");
}

/// Host side of a loopback connection.
///
/// Dropping the host shuts it down.
pub struct LoopbackHost {
    state: Arc<HostState>,
}

impl LoopbackHost {
    /// Starts serving on the current tokio runtime.
    ///
    /// `global` answers calls addressed to [`ReferenceId::GLOBAL`].
    pub fn spawn(
        config: DispatcherConfig,
        global: impl HostObject + 'static,
    ) -> (LoopbackHost, LoopbackDispatcher) {
        let (sender, receiver) = mpsc::channel(config.request_queue());
        let state = Arc::new(HostState {
            global: Arc::new(global),
            registry: ReferenceRegistry::new(),
            config: config.clone(),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(serve(Arc::clone(&state), receiver));
        debug!(?config, "loopback host started");

        let dispatcher = LoopbackDispatcher {
            requests: sender,
            config,
            shutdown: state.shutdown.clone(),
        };
        (LoopbackHost { state }, dispatcher)
    }

    /// Exposes `object` under a fresh identifier the caller can build a handle for.
    pub fn register(&self, object: Arc<dyn HostObject>) -> Result<ReferenceId, RegistryError> {
        self.state.registry.track(object)
    }

    pub fn is_live(&self, id: ReferenceId) -> bool {
        self.state.registry.is_live(id)
    }

    pub fn live_count(&self) -> usize {
        self.state.registry.live_count()
    }

    pub fn is_shut_down(&self) -> bool {
        self.state.shutdown.is_cancelled()
    }

    /// Tears the host down. Every outstanding reference becomes unusable.
    pub fn shutdown(&self) {
        if self.state.shutdown.is_cancelled() {
            return;
        }
        self.state.shutdown.cancel();
        let outstanding = self.state.registry.close();
        debug!(outstanding = outstanding.len(), "loopback host shut down");
    }
}

impl Drop for LoopbackHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Caller side of a loopback connection. Cheap to clone.
#[derive(Clone)]
pub struct LoopbackDispatcher {
    requests: mpsc::Sender<Request>,
    config: DispatcherConfig,
    shutdown: CancellationToken,
}

impl LoopbackDispatcher {
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    async fn round_trip<T, F>(
        &self,
        build: F,
        cancel: Option<&CancellationToken>,
    ) -> Result<T, DispatchError>
    where
        T: Send,
        F: FnOnce(oneshot::Sender<Result<T, DispatchError>>) -> Request + Send,
    {
        let (reply, response) = oneshot::channel();
        let exchange = async move {
            if self.requests.send(build(reply)).await.is_err() {
                return Err(DispatchError::disconnected("loopback host has shut down"));
            }
            match response.await {
                Ok(result) => result,
                Err(_) => Err(DispatchError::disconnected(
                    "loopback host dropped the call",
                )),
            }
        };

        let bounded = async move {
            match self.config.call_timeout() {
                Some(limit) => tokio::time::timeout(limit, exchange)
                    .await
                    .unwrap_or_else(|_| Err(DispatchError::timed_out(limit))),
                None => exchange.await,
            }
        };

        cancellable(cancel, bounded).await
    }
}

fn chunk_stream(receiver: mpsc::Receiver<Bytes>, shutdown: CancellationToken) -> ChunkStream {
    stream::unfold(Some((receiver, shutdown)), |state| async move {
        let (mut receiver, shutdown) = state?;
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Some((
                Err(DispatchError::stream_aborted("host shut down while streaming")),
                None,
            )),
            chunk = receiver.recv() => chunk.map(|chunk| (Ok(chunk), Some((receiver, shutdown)))),
        }
    })
    .boxed()
}

#[async_trait]
impl Dispatcher for LoopbackDispatcher {
    #[instrument(level = "trace", skip(self, args, cancel))]
    async fn invoke(
        &self,
        target: ReferenceId,
        method: &str,
        args: Args,
        cancel: Option<CancellationToken>,
    ) -> Result<Value, DispatchError> {
        let method = method.to_owned();
        self.round_trip(
            |reply| Request::Invoke {
                target,
                method,
                args,
                reply,
            },
            cancel.as_ref(),
        )
        .await
    }

    async fn invoke_void(
        &self,
        target: ReferenceId,
        method: &str,
        args: Args,
        cancel: Option<CancellationToken>,
    ) -> Result<(), DispatchError> {
        self.invoke(target, method, args, cancel).await.map(drop)
    }

    #[instrument(level = "trace", skip(self, cancel))]
    async fn open_stream(
        &self,
        target: ReferenceId,
        max_length: u64,
        cancel: Option<CancellationToken>,
    ) -> Result<DataStream, DispatchError> {
        let receiver = self
            .round_trip(
                |reply| Request::OpenStream {
                    target,
                    max_length,
                    reply,
                },
                cancel.as_ref(),
            )
            .await?;

        let stream = DataStream::new(chunk_stream(receiver, self.shutdown.clone()), max_length);
        Ok(match cancel {
            Some(token) => stream.with_cancellation(token),
            None => stream,
        })
    }
}
