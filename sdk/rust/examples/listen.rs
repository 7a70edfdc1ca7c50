//! Example: Listen on a subscription

use futures::StreamExt;
use hubcap::{Hubcap, ListenOptions, Order, SubscriptionEvent};

#[tokio::main]
async fn main() -> hubcap::Result<()> {
    // Create client from HUBCAP_KEY environment variable
    let client = Hubcap::from_env()?;

    println!("Subscribing to orders and payments...");

    let subscription = client
        .subscription("order-feed", &["orders", "payments"])
        .await?;

    let mut listener = subscription.listen();
    subscription.start_listening(
        ListenOptions::new()
            .timeout(30) // Long-poll window
            .order_by(Order::Ascending), // Oldest first within a batch
    );

    println!("Waiting for messages... (Ctrl+C to exit)");

    while let Some(event) = listener.next().await {
        match event {
            SubscriptionEvent::Messages(batch) => {
                println!("\nReceived {} message(s)", batch.len());
            }
            SubscriptionEvent::Message(message) => {
                println!("  [{}] {}", message.timestamp, message.content);
            }
            SubscriptionEvent::Error(e) => {
                eprintln!("Error: {}", e);
            }
        }
    }

    Ok(())
}
