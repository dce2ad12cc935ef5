// ABOUTME: Minimal test to verify we receive ALL client events
// ABOUTME: Just connects and prints everything the orchestrator emits

use clap::Parser;
use sendspin::{Client, ClientConfig};
use tokio::sync::broadcast::error::RecvError;

/// Minimal Sendspin test client
#[derive(Parser, Debug)]
#[command(name = "minimal_test")]
struct Args {
    /// WebSocket URL of the Sendspin server
    #[arg(short, long, default_value = "ws://192.168.200.8:8927/sendspin")]
    server: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let client = Client::new(
        ClientConfig::default(),
        uuid::Uuid::new_v4().to_string(),
        "Minimal Test Client".to_string(),
        48_000,
    );

    println!("Connecting to {}...", args.server);
    let mut events = client.subscribe();
    client.connect(&args.server).await?;
    println!("Connected!");

    println!("\nListening for ALL events from the client...\n");

    loop {
        match events.recv().await {
            Ok(event) => println!("[EVENT] {:?}", event),
            Err(RecvError::Lagged(skipped)) => {
                eprintln!("dropped {skipped} events, falling behind");
            }
            Err(RecvError::Closed) => {
                println!("Event stream closed");
                break;
            }
        }
    }

    Ok(())
}
