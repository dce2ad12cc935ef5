// ABOUTME: Basic example demonstrating connection and handshake
// ABOUTME: Connects to a server and waits for the handshake to complete, then exits

use clap::Parser;
use sendspin::{Client, ClientConfig};

/// Sendspin basic client
#[derive(Parser, Debug)]
#[command(name = "basic_client")]
#[command(about = "Test connection to a Sendspin server", long_about = None)]
struct Args {
    /// WebSocket URL of the Sendspin server
    #[arg(short, long, default_value = "ws://localhost:8927/sendspin")]
    server: String,

    /// Client name
    #[arg(short, long, default_value = "Sendspin-RS Basic Client")]
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Args::parse();

    let client = Client::new(
        ClientConfig::default(),
        uuid::Uuid::new_v4().to_string(),
        args.name.clone(),
        48_000,
    );

    println!("Connecting to {}...", args.server);
    client.connect(&args.server).await?;
    println!("Connected! Handshake complete, connection state: {:?}", client.connection_state());

    client.disconnect(sendspin::protocol::messages::GoodbyeReason::Shutdown).await;
    Ok(())
}
