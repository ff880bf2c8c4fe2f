use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing_subscriber::EnvFilter;

use seclink_core::harness::spawn_responder;
use seclink_core::{ConnectionState, MarkedEchoProcessor, SecureChannel};
use seclink_transport::{EndpointId, MemoryHub};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let hub = MemoryHub::new();
    let endpoint = EndpointId::new("seclink.responder");

    // Responder process: decrypts, marks, re-encrypts.
    let responder = spawn_responder(
        &hub,
        &endpoint,
        Arc::new(MarkedEchoProcessor::new("*#FROM_SERVER_")),
    )?;

    // Caller process: bind, then drive the request cycle.
    let channel = SecureChannel::with_rebind_delay(
        hub.clone(),
        endpoint.clone(),
        Duration::from_millis(500),
    )?;

    let mut states = channel.state_stream();
    tokio::spawn(async move {
        loop {
            let state = *states.borrow_and_update();
            println!("STATE {state:?}");
            if states.changed().await.is_err() {
                break;
            }
        }
    });

    let mut pushes = channel.push_stream().expect("push stream taken once");
    tokio::spawn(async move {
        while let Some(note) = pushes.recv().await {
            println!("PUSH  {}", note.text);
        }
    });

    channel.bind().await?;

    let reply = channel.send_request("hello from the caller").await?;
    println!("REPLY {reply}");

    // Kill the responder, watch the channel notice and re-bind on its own.
    responder.shutdown();
    sleep(Duration::from_millis(100)).await;
    let _restarted = spawn_responder(
        &hub,
        &endpoint,
        Arc::new(MarkedEchoProcessor::new("*#FROM_SERVER_")),
    )?;

    timeout(Duration::from_secs(5), async {
        while channel.state() != ConnectionState::Connected {
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .map_err(|_| anyhow::anyhow!("channel did not re-bind"))?;

    let reply = channel.send_request("hello again").await?;
    println!("REPLY {reply}");

    channel.unbind();
    sleep(Duration::from_millis(100)).await;
    Ok(())
}
