mod args;
mod config;
mod dispatcher;
pub mod loopback;
mod stream;

pub use args::Args;
pub use config::{DispatcherConfig, DispatcherConfigBuilder};
pub use dispatcher::{Dispatcher, cancellable, decode_result};
pub use loopback::{HostBlob, HostError, HostObject, HostReply, LoopbackDispatcher, LoopbackHost};
pub use stream::{ChunkStream, DataStream};

#[doc(hidden)]
pub use serde_json;
pub use tokio_util::sync::CancellationToken;
