mod error;
mod id;
mod registry;
mod state;

pub use error::{DispatchError, DispatchErrorKind, ObjectDisposedError, RegistryError};
pub use id::{REFERENCE_MARKER_KEY, RELEASE_METHOD, ReferenceId, ReferenceMarker};
pub use registry::ReferenceRegistry;
pub use state::{DisposeFlag, Liveness};
