use farcall_core::{DispatchError, DispatchErrorKind, ObjectDisposedError, RegistryError};
use thiserror::Error;

/// Unified error type for the `farcall` framework.
///
/// Aggregates errors from the sub-crates into a single type for
/// application-level error handling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FarcallError {
    /// A handle was used after it had been disposed. Always a caller bug.
    #[error(transparent)]
    Disposed(#[from] ObjectDisposedError),

    /// The dispatcher or the host failed the operation.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// Identifier bookkeeping on the host failed.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl FarcallError {
    pub fn is_disposed(&self) -> bool {
        matches!(self, FarcallError::Disposed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        self.dispatch_kind() == Some(DispatchErrorKind::Cancelled)
    }

    /// The dispatcher failure kind, when this error came from a dispatch.
    pub fn dispatch_kind(&self) -> Option<DispatchErrorKind> {
        match self {
            FarcallError::Dispatch(err) => Some(err.kind()),
            _ => None,
        }
    }
}
