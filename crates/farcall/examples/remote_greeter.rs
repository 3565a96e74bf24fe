use async_trait::async_trait;
use farcall::prelude::*;
use farcall::telemetry::TelemetryConfig;
use farcall::transport::{
    DispatcherConfig, HostBlob, HostError, HostObject, HostReply, LoopbackHost,
};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;

/// The host's global object.
struct Lobby;

#[async_trait]
impl HostObject for Lobby {
    async fn call(&self, method: &str, args: Args) -> Result<HostReply, HostError> {
        match method {
            "greet" => {
                let name = args.get(0).and_then(Value::as_str).unwrap_or("stranger");
                Ok(HostReply::Value(json!(format!("hello {name}"))))
            }
            "motd" => Ok(HostReply::Object(Arc::new(HostBlob::new(
                "Welcome to the far side. Mind the latency.",
            )))),
            other => Err(HostError::new(format!("unknown method '{other}'"))),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    TelemetryConfig::builder()
        .service_name("remote-greeter")
        .log_level("farcall=debug,info")
        .build()
        .init()?;

    let config = DispatcherConfig::builder()
        .call_timeout(Duration::from_secs(2))
        .stream_chunk_size(8)
        .build();
    let (host, dispatcher) = LoopbackHost::spawn(config, Lobby);
    let lobby = RemoteReference::new(Arc::new(dispatcher), ReferenceId::GLOBAL);

    // 1. Plain call on the global object
    let greeting: String = lobby.invoke("greet", args!["world"]).await?;
    println!("{greeting}");

    // 2. A call that hands back a reference to another host object
    let motd = lobby.invoke_reference("motd", Args::none()).await?;
    println!("host now tracks {} object(s)", host.live_count());

    let text = motd.open_data_stream(1024, None).await?.read_to_end().await?;
    println!("{}", String::from_utf8_lossy(&text));

    // 3. Release it; the handle is now unusable
    motd.dispose().await?;
    println!("host now tracks {} object(s)", host.live_count());
    if let Err(err) = motd.invoke_void("size", Args::none(), None).await {
        println!("as expected: {err}");
    }

    host.shutdown();
    Ok(())
}
