//! Example: Publish a message to a channel

use hubcap::Hubcap;
use serde_json::json;

#[tokio::main]
async fn main() -> hubcap::Result<()> {
    // Create client from HUBCAP_KEY environment variable
    let client = Hubcap::from_env()?;

    // Publish a message (the channel is created on first use)
    let message = client
        .publish(
            "orders",
            json!({
                "order_id": "ord_123",
                "customer": "john@example.com",
                "total": 99.99
            }),
        )
        .await?;

    println!("Message published!");
    println!("  Timestamp: {}", message.timestamp);
    if let Some(at) = message.timestamp.to_datetime() {
        println!("  At: {}", at);
    }

    Ok(())
}
