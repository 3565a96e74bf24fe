use crate::id::ReferenceId;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Raised by a handle, before anything is dispatched, when it is used after disposal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot access a disposed object: {object_name} {id}")]
pub struct ObjectDisposedError {
    object_name: &'static str,
    id: ReferenceId,
}

impl ObjectDisposedError {
    pub fn new(object_name: &'static str, id: ReferenceId) -> Self {
        Self { object_name, id }
    }

    /// Creates the error for handle type `H`, named without its module path.
    pub fn for_type<H: ?Sized>(id: ReferenceId) -> Self {
        let full = std::any::type_name::<H>();
        let object_name = full.rsplit("::").next().unwrap_or(full);
        Self::new(object_name, id)
    }

    /// The concrete handle kind that was used after disposal.
    pub fn object_name(&self) -> &'static str {
        self.object_name
    }

    pub fn id(&self) -> ReferenceId {
        self.id
    }
}

/// What went wrong on the far side of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchErrorKind {
    /// No response arrived within the configured call timeout.
    Timeout,
    /// The host ran the call and it failed there.
    HostException,
    /// The response could not be decoded into the requested shape.
    DecodeError,
    /// The host is gone, or the connection to it was torn down.
    Disconnected,
    /// A data stream was cut off by the host side.
    StreamAborted,
    /// The caller cancelled the operation.
    Cancelled,
}

impl fmt::Display for DispatchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DispatchErrorKind::Timeout => "timeout",
            DispatchErrorKind::HostException => "host exception",
            DispatchErrorKind::DecodeError => "decode error",
            DispatchErrorKind::Disconnected => "disconnected",
            DispatchErrorKind::StreamAborted => "stream aborted",
            DispatchErrorKind::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Failure surfaced by a dispatcher. Handles pass these through untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct DispatchError {
    kind: DispatchErrorKind,
    message: String,
}

impl DispatchError {
    pub fn new(kind: DispatchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timed_out(after: Duration) -> Self {
        Self::new(
            DispatchErrorKind::Timeout,
            format!("no response after {after:?}"),
        )
    }

    pub fn host_exception(message: impl Into<String>) -> Self {
        Self::new(DispatchErrorKind::HostException, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(DispatchErrorKind::DecodeError, message)
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(DispatchErrorKind::Disconnected, message)
    }

    pub fn stream_aborted(message: impl Into<String>) -> Self {
        Self::new(DispatchErrorKind::StreamAborted, message)
    }

    pub fn cancelled() -> Self {
        Self::new(DispatchErrorKind::Cancelled, "operation was cancelled")
    }

    pub fn kind(&self) -> DispatchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == DispatchErrorKind::Cancelled
    }
}

impl From<DispatchError> for std::io::Error {
    fn from(err: DispatchError) -> Self {
        let kind = match err.kind {
            DispatchErrorKind::Timeout => std::io::ErrorKind::TimedOut,
            DispatchErrorKind::Cancelled => std::io::ErrorKind::Interrupted,
            DispatchErrorKind::Disconnected => std::io::ErrorKind::ConnectionAborted,
            DispatchErrorKind::StreamAborted => std::io::ErrorKind::UnexpectedEof,
            DispatchErrorKind::DecodeError => std::io::ErrorKind::InvalidData,
            DispatchErrorKind::HostException => std::io::ErrorKind::Other,
        };
        std::io::Error::new(kind, err)
    }
}

/// Deterministic lookup failures of a [`ReferenceRegistry`](crate::ReferenceRegistry).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// The identifier was never handed out by this registry.
    #[error("reference {0} was never allocated")]
    NotFound(ReferenceId),
    /// The identifier was handed out and has since been released.
    #[error("reference {0} has already been released")]
    Released(ReferenceId),
    /// The registry was torn down together with its host.
    #[error("reference registry has been torn down")]
    Closed,
}
