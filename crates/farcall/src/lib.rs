//! Typed, disposable handles to objects living in another execution context.
//!
//! ```no_run
//! use farcall::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn demo(dispatcher: Arc<dyn Dispatcher>) -> Result<(), FarcallError> {
//! let greeter = RemoteReference::new(dispatcher, ReferenceId(7));
//! let greeting: String = greeter.invoke("greet", args!["world"]).await?;
//! assert_eq!(greeting, "hello world");
//! greeter.dispose().await?;
//! # Ok(())
//! # }
//! ```

pub use farcall_core as core;
pub use farcall_transport as transport;

pub mod error;
pub mod reference;
pub mod telemetry;

pub use error::FarcallError;
pub use reference::{AsyncDispose, DataReference, ObjectReference, RemoteReference};

pub mod prelude {
    pub use crate::error::FarcallError;
    pub use crate::reference::{AsyncDispose, DataReference, ObjectReference, RemoteReference};
    pub use farcall_core::{DispatchError, DispatchErrorKind, ObjectDisposedError, ReferenceId};
    pub use farcall_transport::{Args, CancellationToken, DataStream, Dispatcher, args};
}
