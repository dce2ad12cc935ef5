// ABOUTME: End-to-end player example
// ABOUTME: Connects to a server, drives the audio pipeline, and logs every client event

use clap::Parser;
use sendspin::events::ClientEvent;
use sendspin::protocol::messages::GoodbyeReason;
use sendspin::{Client, ClientConfig};
use tokio::sync::broadcast::error::RecvError;

/// Sendspin audio player
#[derive(Parser, Debug)]
#[command(name = "player")]
#[command(about = "Connect to a Sendspin server and play audio", long_about = None)]
struct Args {
    /// WebSocket URL of the Sendspin server
    #[arg(short, long, default_value = "ws://localhost:8927/sendspin")]
    server: String,

    /// Client name
    #[arg(short, long, default_value = "Sendspin-RS Player")]
    name: String,

    /// Output device sample rate
    #[arg(long, default_value_t = 48_000)]
    device_sample_rate: u32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let client = Client::new(
        ClientConfig::default(),
        uuid::Uuid::new_v4().to_string(),
        args.name.clone(),
        args.device_sample_rate,
    );

    let mut events = client.subscribe();
    let event_task = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(ClientEvent::ConnectionStateChanged(state)) => {
                    println!("connection state: {:?}", state);
                }
                Ok(ClientEvent::PipelineStateChanged(state)) => {
                    println!("pipeline state: {:?}", state);
                }
                Ok(ClientEvent::GroupUpdated(snapshot)) => {
                    if let Some(metadata) = &snapshot.metadata {
                        println!(
                            "now playing: {} - {}",
                            metadata.artist.as_deref().unwrap_or("?"),
                            metadata.title.as_deref().unwrap_or("?")
                        );
                    }
                }
                Ok(ClientEvent::ClockSyncConverged) => {
                    println!("clock sync converged");
                }
                Ok(ClientEvent::ArtworkUpdated { channel, data }) => {
                    println!("artwork channel {channel} updated ({} bytes)", data.map_or(0, |d| d.len()));
                }
                Ok(ClientEvent::VisualizerFrame { timestamp, data }) => {
                    println!("visualizer frame ts={timestamp} len={}", data.len());
                }
                Ok(ClientEvent::SteadyStateError(message)) => {
                    eprintln!("steady-state error: {message}");
                }
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!("dropped {skipped} events, falling behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("Connecting to {}...", args.server);
    client.connect(&args.server).await?;
    println!("Connected! Waiting for streams...");

    tokio::signal::ctrl_c().await?;
    println!("Shutting down...");
    client.disconnect(GoodbyeReason::Shutdown).await;
    event_task.abort();

    Ok(())
}
